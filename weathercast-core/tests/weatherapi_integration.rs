//! Integration tests for the weatherapi.com client and the orchestrator on top of it,
//! run against a wiremock server.

use chrono::NaiveDate;
use weathercast_core::{
    Phase, WeatherError, WeatherOrchestrator, WeatherProvider,
    provider::weatherapi::WeatherApiProvider,
};
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn location(name: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "region": name,
        "country": "China",
        "lat": 39.93,
        "lon": 116.39,
        "tz_id": "Asia/Shanghai",
        "localtime": "2024-01-01 12:00"
    })
}

fn current(temp_c: f64, text: &str) -> serde_json::Value {
    serde_json::json!({
        "temp_c": temp_c,
        "temp_f": temp_c * 9.0 / 5.0 + 32.0,
        "condition": {"text": text, "icon": "//cdn/113.png", "code": 1000},
        "wind_kph": 8.0,
        "wind_dir": "NW",
        "pressure_mb": 1015.0,
        "humidity": 65,
        "cloud": 0,
        "feelslike_c": temp_c - 1.0,
        "vis_km": 10.0,
        "uv": 4.0,
        "is_day": 1
    })
}

fn forecast_day(date: &str, max: f64, min: f64) -> serde_json::Value {
    serde_json::json!({
        "date": date,
        "day": {
            "maxtemp_c": max,
            "mintemp_c": min,
            "avgtemp_c": (max + min) / 2.0,
            "condition": {"text": "Partly cloudy", "icon": "//cdn/116.png", "code": 1003},
            "avghumidity": 55.4,
            "daily_chance_of_rain": 20,
            "uv": 3.0
        },
        "hour": [
            {
                "time": format!("{date} 00:00"),
                "temp_c": min,
                "condition": {"text": "Clear", "icon": "//cdn/113.png", "code": 1000},
                "wind_kph": 5.0,
                "humidity": 70,
                "chance_of_rain": 0,
                "is_day": 0
            }
        ]
    })
}

fn forecast_body(name: &str, days: usize) -> serde_json::Value {
    let forecastday: Vec<_> = (1..=days)
        .map(|d| forecast_day(&format!("2024-01-{d:02}"), 10.0 + d as f64, d as f64))
        .collect();
    serde_json::json!({
        "location": location(name),
        "current": current(15.0, "Clear"),
        "forecast": {"forecastday": forecastday}
    })
}

async fn mount_current(server: &MockServer, query: &str, temp_c: f64, text: &str) {
    Mock::given(method("GET"))
        .and(path("/current.json"))
        .and(query_param("key", "TEST_KEY"))
        .and(query_param("q", query))
        .and(query_param("aqi", "no"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "location": location(query),
            "current": current(temp_c, text)
        })))
        .mount(server)
        .await;
}

fn provider(server: &MockServer) -> WeatherApiProvider {
    WeatherApiProvider::with_base_url("TEST_KEY".into(), &server.uri())
}

#[tokio::test]
async fn test_current_success() {
    let server = MockServer::start().await;
    mount_current(&server, "Beijing", 15.0, "Clear").await;

    let snapshot = provider(&server).current("Beijing").await.unwrap();

    assert_eq!(snapshot.location.name, "Beijing");
    assert_eq!(snapshot.current.temp_c, 15.0);
    assert_eq!(snapshot.current.condition.text, "Clear");
    assert_eq!(snapshot.current.humidity_pct, 65);
    assert_eq!(snapshot.current.wind_dir, "NW");
    assert!(snapshot.forecast_days.is_empty());
}

#[tokio::test]
async fn test_forecast_sends_day_count_and_flags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecast.json"))
        .and(query_param("q", "Beijing"))
        .and(query_param("days", "7"))
        .and(query_param("aqi", "no"))
        .and(query_param("alerts", "no"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body("Beijing", 7)))
        .mount(&server)
        .await;

    let snapshot = provider(&server).forecast("Beijing", 7).await.unwrap();

    assert_eq!(snapshot.forecast_days.len(), 7);
    let first = &snapshot.forecast_days[0];
    assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    assert_eq!(first.summary.max_temp_c, 11.0);
    assert_eq!(first.summary.avg_humidity_pct, 55);
    assert_eq!(first.summary.rain_chance_pct, 20);
    assert_eq!(first.hours.len(), 1);
    assert!(!first.hours[0].is_day);
}

#[tokio::test]
async fn test_search_returns_candidates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.json"))
        .and(query_param("q", "Lon"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 2801268, "name": "London", "region": "City of London, Greater London",
             "country": "United Kingdom", "lat": 51.52, "lon": -0.11, "url": "london-city"},
            {"id": 315398, "name": "Londrina", "region": "Parana",
             "country": "Brazil", "lat": -23.3, "lon": -51.15, "url": "londrina"}
        ])))
        .mount(&server)
        .await;

    let cities = provider(&server).search("Lon").await.unwrap();

    assert_eq!(cities.len(), 2);
    assert_eq!(cities[0].name, "London");
    assert_eq!(cities[0].display_name(), "London, City of London, Greater London, United Kingdom");
    assert_eq!(cities[1].country, "Brazil");
}

#[tokio::test]
async fn test_history_sends_date() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history.json"))
        .and(query_param("q", "Beijing"))
        .and(query_param("dt", "2024-01-03"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "location": location("Beijing"),
            "forecast": {"forecastday": [forecast_day("2024-01-03", 8.0, 2.0)]}
        })))
        .mount(&server)
        .await;

    let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
    let snapshot = provider(&server).history("Beijing", date).await.unwrap();

    assert_eq!(snapshot.location.name, "Beijing");
    assert_eq!(snapshot.forecast_days.len(), 1);
    assert!(snapshot.forecast_day(date).is_some());
    assert_eq!(snapshot.current.temp_c, 5.0);
    assert_eq!(snapshot.current.condition.text, "Partly cloudy");
}

#[tokio::test]
async fn test_history_without_days_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "location": location("Beijing"),
            "forecast": {"forecastday": []}
        })))
        .mount(&server)
        .await;

    let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
    let err = provider(&server).history("Beijing", date).await.unwrap_err();
    assert!(matches!(err, WeatherError::Parse(_)), "{err:?}");
}

#[tokio::test]
async fn test_error_status_carries_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/current.json"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"code": 1006, "message": "No matching location found."}
        })))
        .mount(&server)
        .await;

    let err = provider(&server).current("UnknownPlace").await.unwrap_err();

    match err {
        WeatherError::Status { code, message } => {
            assert_eq!(code, 400);
            assert_eq!(message, "No matching location found.");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_error_body_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/current.json"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&server)
        .await;

    let err = provider(&server).current("Beijing").await.unwrap_err();
    assert_eq!(err.to_string(), "Weather provider returned status 502: Bad Gateway");
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/current.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"unexpected": true})))
        .mount(&server)
        .await;

    let err = provider(&server).current("Beijing").await.unwrap_err();
    assert!(matches!(err, WeatherError::Parse(_)), "{err:?}");
}

#[tokio::test]
async fn test_orchestrator_selects_normalized_city() {
    let server = MockServer::start().await;
    mount_current(&server, "Beijing", 15.0, "Clear").await;
    Mock::given(method("GET"))
        .and(path("/forecast.json"))
        .and(query_param("q", "Beijing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body("Beijing", 7)))
        .mount(&server)
        .await;

    let orchestrator = WeatherOrchestrator::new(Arc::new(provider(&server)), 7);
    let settled = orchestrator.select_city("北京").settled().await;
    assert!(settled.current_applied && settled.forecast_applied);

    let state = orchestrator.state();
    assert_eq!(state.phase, Phase::Ready);
    assert!(!state.is_loading);
    assert!(state.error.is_none());
    assert_eq!(state.selected_city.as_deref(), Some("北京"));
    assert_eq!(state.current.unwrap().current.condition.text, "Clear");
    assert_eq!(state.forecast.unwrap().forecast_days.len(), 7);
}

#[tokio::test]
async fn test_orchestrator_surfaces_unknown_city() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"code": 1006, "message": "No matching location found."}
        })))
        .mount(&server)
        .await;

    let orchestrator = WeatherOrchestrator::new(Arc::new(provider(&server)), 7);
    orchestrator.select_city("UnknownPlace").settled().await;

    let state = orchestrator.state();
    assert_eq!(state.phase, Phase::Failed);
    assert!(!state.is_loading);
    assert!(state.current.is_none());
    assert!(state.error.unwrap().contains("No matching location found."));
}
