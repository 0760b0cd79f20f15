use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Place metadata reported by the weather provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub timezone_id: String,
    /// Provider-local wall clock, `YYYY-MM-DD HH:MM`.
    pub local_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub text: String,
    pub code: i32,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temp_c: f64,
    pub temp_f: f64,
    pub condition: Condition,
    pub wind_kph: f64,
    pub wind_dir: String,
    pub pressure_mb: f64,
    pub humidity_pct: u8,
    pub cloud_pct: u8,
    pub feels_like_c: f64,
    pub vis_km: f64,
    pub uv: f64,
    pub is_day: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub max_temp_c: f64,
    pub min_temp_c: f64,
    pub avg_temp_c: f64,
    pub condition: Condition,
    pub avg_humidity_pct: u8,
    pub rain_chance_pct: u8,
    pub uv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourForecast {
    /// Provider-local time, `YYYY-MM-DD HH:MM`.
    pub time: String,
    pub temp_c: f64,
    pub condition: Condition,
    pub wind_kph: f64,
    pub humidity_pct: u8,
    pub rain_chance_pct: u8,
    pub is_day: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub summary: DaySummary,
    pub hours: Vec<HourForecast>,
}

/// One coherent provider response. Current-only calls leave `forecast_days` empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location: Location,
    pub current: CurrentConditions,
    pub forecast_days: Vec<ForecastDay>,
}

impl WeatherSnapshot {
    /// Whole degrees Celsius, truncated toward zero the way the display surfaces show it.
    pub fn temp_whole_c(&self) -> i32 {
        self.current.temp_c as i32
    }

    pub fn forecast_day(&self, date: NaiveDate) -> Option<&ForecastDay> {
        self.forecast_days.iter().find(|d| d.date == date)
    }
}

/// A place candidate returned by provider search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    /// `"lat,lon"`, stable enough to dedupe candidates.
    pub id: String,
    pub name: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

impl City {
    pub fn display_name(&self) -> String {
        if self.region.is_empty() || self.region == self.name {
            format!("{}, {}", self.name, self.country)
        } else {
            format!("{}, {}, {}", self.name, self.region, self.country)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn temp_whole_truncates_toward_zero() {
        assert_eq!(snapshot("Beijing", 15.9, "Clear").temp_whole_c(), 15);
        assert_eq!(snapshot("Harbin", -3.7, "Snow").temp_whole_c(), -3);
    }

    #[test]
    fn forecast_day_lookup_by_date() {
        let snap = with_forecast(snapshot("Beijing", 15.0, "Clear"), 3);
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(snap.forecast_day(day).map(|d| d.date), Some(day));
        assert!(snap.forecast_day(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()).is_none());
    }

    #[test]
    fn city_display_name_skips_duplicate_region() {
        let city = City {
            id: "39.93,116.39".into(),
            name: "Beijing".into(),
            region: "Beijing".into(),
            country: "China".into(),
            lat: 39.93,
            lon: 116.39,
        };
        assert_eq!(city.display_name(), "Beijing, China");
    }
}
