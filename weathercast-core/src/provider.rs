use crate::{
    Config, WeatherError,
    model::{City, WeatherSnapshot},
    provider::weatherapi::WeatherApiProvider,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::{convert::TryFrom, fmt::Debug, sync::Arc};

pub mod weatherapi;

/// External services that need credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceId {
    /// Weather data (weatherapi.com).
    WeatherApi,
    /// Narration text generation (OpenAI-compatible chat completions).
    DeepSeek,
}

impl ServiceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::WeatherApi => "weatherapi",
            ServiceId::DeepSeek => "deepseek",
        }
    }

    pub const fn all() -> &'static [ServiceId] {
        &[ServiceId::WeatherApi, ServiceId::DeepSeek]
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ServiceId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "weatherapi" => Ok(ServiceId::WeatherApi),
            "deepseek" => Ok(ServiceId::DeepSeek),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: weatherapi, deepseek."
            )),
        }
    }
}

/// Query-based weather provider. Every call is one request/response exchange.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Current conditions only; `forecast_days` of the result is empty.
    async fn current(&self, query: &str) -> Result<WeatherSnapshot, WeatherError>;

    async fn forecast(&self, query: &str, days: u8) -> Result<WeatherSnapshot, WeatherError>;

    async fn search(&self, query: &str) -> Result<Vec<City>, WeatherError>;

    /// Observed weather for one past date.
    async fn history(&self, query: &str, date: NaiveDate) -> Result<WeatherSnapshot, WeatherError>;
}

/// Where a requested date falls relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRequest {
    Today,
    Past(NaiveDate),
    Future(NaiveDate),
}

pub fn classify_date(today: NaiveDate, requested: Option<NaiveDate>) -> DateRequest {
    match requested {
        None => DateRequest::Today,
        Some(d) if d == today => DateRequest::Today,
        Some(d) if d < today => DateRequest::Past(d),
        Some(d) => DateRequest::Future(d),
    }
}

/// Construct the weather provider from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let api_key = config.require_api_key(ServiceId::WeatherApi)?;

    let provider = match config.provider_base_url(ServiceId::WeatherApi) {
        Some(base) => WeatherApiProvider::with_base_url(api_key.to_owned(), base),
        None => WeatherApiProvider::new(api_key.to_owned()),
    };

    Ok(Arc::new(provider))
}
