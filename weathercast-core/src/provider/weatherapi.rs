use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    error::{WeatherError, truncate_body},
    model::{
        City, Condition, CurrentConditions, DaySummary, ForecastDay, HourForecast, Location,
        WeatherSnapshot,
    },
};

use super::WeatherProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com/v1";

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, WeatherError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let res = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        debug!(endpoint, status = status.as_u16(), "weatherapi response");

        if !status.is_success() {
            let message = serde_json::from_str::<WaErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| truncate_body(&body));
            return Err(WeatherError::Status {
                code: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| WeatherError::Parse(format!("{endpoint}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct WaErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct WaErrorResponse {
    error: WaErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    country: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    tz_id: String,
    #[serde(default)]
    localtime: String,
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
    #[serde(default)]
    icon: String,
    #[serde(default)]
    code: i32,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    temp_f: f64,
    condition: WaCondition,
    wind_kph: f64,
    #[serde(default)]
    wind_dir: String,
    #[serde(default)]
    pressure_mb: f64,
    humidity: f64,
    #[serde(default)]
    cloud: f64,
    feelslike_c: f64,
    #[serde(default)]
    vis_km: f64,
    #[serde(default)]
    uv: f64,
    #[serde(default)]
    is_day: u8,
}

#[derive(Debug, Deserialize)]
struct WaDay {
    maxtemp_c: f64,
    mintemp_c: f64,
    avgtemp_c: f64,
    condition: WaCondition,
    #[serde(default)]
    avghumidity: f64,
    #[serde(default)]
    daily_chance_of_rain: f64,
    #[serde(default)]
    uv: f64,
}

#[derive(Debug, Deserialize)]
struct WaHour {
    time: String,
    temp_c: f64,
    condition: WaCondition,
    #[serde(default)]
    wind_kph: f64,
    #[serde(default)]
    humidity: f64,
    #[serde(default)]
    chance_of_rain: f64,
    #[serde(default)]
    is_day: u8,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    date: NaiveDate,
    day: WaDay,
    #[serde(default)]
    hour: Vec<WaHour>,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    location: WaLocation,
    current: WaCurrent,
    #[serde(default)]
    forecast: Option<WaForecast>,
}

/// `history.json` carries no `current` block.
#[derive(Debug, Deserialize)]
struct WaHistoryResponse {
    location: WaLocation,
    forecast: WaForecast,
}

#[derive(Debug, Deserialize)]
struct WaSearchResult {
    name: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    country: String,
    lat: f64,
    lon: f64,
}

impl From<WaCondition> for Condition {
    fn from(c: WaCondition) -> Self {
        Condition {
            text: c.text,
            code: c.code,
            icon: c.icon,
        }
    }
}

impl From<WaLocation> for Location {
    fn from(l: WaLocation) -> Self {
        Location {
            name: l.name,
            region: l.region,
            country: l.country,
            lat: l.lat,
            lon: l.lon,
            timezone_id: l.tz_id,
            local_time: l.localtime,
        }
    }
}

impl From<WaResponse> for WeatherSnapshot {
    fn from(r: WaResponse) -> Self {
        let location = r.location.into();

        let c = r.current;
        let current = CurrentConditions {
            temp_c: c.temp_c,
            temp_f: c.temp_f,
            condition: c.condition.into(),
            wind_kph: c.wind_kph,
            wind_dir: c.wind_dir,
            pressure_mb: c.pressure_mb,
            humidity_pct: pct(c.humidity),
            cloud_pct: pct(c.cloud),
            feels_like_c: c.feelslike_c,
            vis_km: c.vis_km,
            uv: c.uv,
            is_day: c.is_day != 0,
        };

        let forecast_days = r
            .forecast
            .map(|f| f.forecastday.into_iter().map(ForecastDay::from).collect())
            .unwrap_or_default();

        WeatherSnapshot {
            location,
            current,
            forecast_days,
        }
    }
}

impl From<WaForecastDay> for ForecastDay {
    fn from(d: WaForecastDay) -> Self {
        ForecastDay {
            date: d.date,
            summary: DaySummary {
                max_temp_c: d.day.maxtemp_c,
                min_temp_c: d.day.mintemp_c,
                avg_temp_c: d.day.avgtemp_c,
                condition: d.day.condition.into(),
                avg_humidity_pct: pct(d.day.avghumidity),
                rain_chance_pct: pct(d.day.daily_chance_of_rain),
                uv: d.day.uv,
            },
            hours: d
                .hour
                .into_iter()
                .map(|h| HourForecast {
                    time: h.time,
                    temp_c: h.temp_c,
                    condition: h.condition.into(),
                    wind_kph: h.wind_kph,
                    humidity_pct: pct(h.humidity),
                    rain_chance_pct: pct(h.chance_of_rain),
                    is_day: h.is_day != 0,
                })
                .collect(),
        }
    }
}

impl WaHistoryResponse {
    /// Past days have no live reading, so `current` is filled from the
    /// requested day's summary.
    fn into_snapshot(self) -> Result<WeatherSnapshot, WeatherError> {
        let forecast_days: Vec<ForecastDay> = self
            .forecast
            .forecastday
            .into_iter()
            .map(ForecastDay::from)
            .collect();
        let Some(day) = forecast_days.first() else {
            return Err(WeatherError::Parse(
                "history.json: no forecastday entries".to_string(),
            ));
        };

        let s = &day.summary;
        let current = CurrentConditions {
            temp_c: s.avg_temp_c,
            temp_f: s.avg_temp_c * 9.0 / 5.0 + 32.0,
            condition: s.condition.clone(),
            wind_kph: 0.0,
            wind_dir: String::new(),
            pressure_mb: 0.0,
            humidity_pct: s.avg_humidity_pct,
            cloud_pct: 0,
            feels_like_c: s.avg_temp_c,
            vis_km: 0.0,
            uv: s.uv,
            is_day: true,
        };

        Ok(WeatherSnapshot {
            location: self.location.into(),
            current,
            forecast_days,
        })
    }
}

impl From<WaSearchResult> for City {
    fn from(s: WaSearchResult) -> Self {
        City {
            id: format!("{},{}", s.lat, s.lon),
            name: s.name,
            region: s.region,
            country: s.country,
            lat: s.lat,
            lon: s.lon,
        }
    }
}

/// Percentages arrive as ints or floats depending on the endpoint.
fn pct(v: f64) -> u8 {
    v.round().clamp(0.0, 100.0) as u8
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn current(&self, query: &str) -> Result<WeatherSnapshot, WeatherError> {
        let parsed: WaResponse = self
            .get_json("current.json", &[("q", query), ("aqi", "no")])
            .await?;
        Ok(parsed.into())
    }

    async fn forecast(&self, query: &str, days: u8) -> Result<WeatherSnapshot, WeatherError> {
        let days = days.to_string();
        let parsed: WaResponse = self
            .get_json(
                "forecast.json",
                &[
                    ("q", query),
                    ("days", days.as_str()),
                    ("aqi", "no"),
                    ("alerts", "no"),
                ],
            )
            .await?;
        Ok(parsed.into())
    }

    async fn search(&self, query: &str) -> Result<Vec<City>, WeatherError> {
        let parsed: Vec<WaSearchResult> = self.get_json("search.json", &[("q", query)]).await?;
        Ok(parsed.into_iter().map(City::from).collect())
    }

    async fn history(&self, query: &str, date: NaiveDate) -> Result<WeatherSnapshot, WeatherError> {
        let dt = date.format("%Y-%m-%d").to_string();
        let parsed: WaHistoryResponse = self
            .get_json("history.json", &[("q", query), ("dt", dt.as_str())])
            .await?;
        parsed.into_snapshot()
    }
}
