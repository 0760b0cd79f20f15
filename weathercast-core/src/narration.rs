//! Weather narration text.
//!
//! One call to a text-generation service per narration. Any failure, of any
//! kind, falls back to a rule-based template, so [`BroadcastTextGenerator::generate`]
//! always yields speakable text.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    config::{Config, NarrationConfig},
    error::GenerationError,
    model::WeatherSnapshot,
    provider::ServiceId,
};

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
const MAX_WORDS: u32 = 60;

/// Narration input derived from current conditions. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastRequest {
    pub city: String,
    /// Display form, e.g. `15°C`.
    pub temperature: String,
    pub condition: String,
    pub humidity: String,
    pub wind_speed: String,
    pub air_quality: Option<String>,
    temperature_c: i32,
}

impl BroadcastRequest {
    pub fn from_snapshot(snapshot: &WeatherSnapshot) -> Self {
        let current = &snapshot.current;
        let temperature_c = snapshot.temp_whole_c();
        Self {
            city: snapshot.location.name.clone(),
            temperature: format!("{temperature_c}°C"),
            condition: current.condition.text.clone(),
            humidity: format!("{}%", current.humidity_pct),
            wind_speed: format!("{}km/h", current.wind_kph),
            air_quality: None,
            temperature_c,
        }
    }

    pub fn prompt(&self) -> String {
        let air = self
            .air_quality
            .as_ref()
            .map(|aq| format!("Air quality: {aq}\n"))
            .unwrap_or_default();

        format!(
            "You are a witty weather presenter. Write a short, lively weather report \
             for the conditions below, with practical advice.\n\n\
             City: {city}\n\
             Temperature: {temperature}\n\
             Condition: {condition}\n\
             Humidity: {humidity}\n\
             Wind speed: {wind}\n\
             {air}\n\
             Requirements:\n\
             1. Humorous but useful\n\
             2. Include clothing and travel advice\n\
             3. Keep it under {MAX_WORDS} words\n\
             4. English only\n\
             5. Natural tone, suitable for reading aloud\n\n\
             Reply with the report text only, no explanations.",
            city = self.city,
            temperature = self.temperature,
            condition = self.condition,
            humidity = self.humidity,
            wind = self.wind_speed,
        )
    }
}

/// Temperature bands used by the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempBand {
    Freezing,
    Cold,
    Mild,
    Warm,
    Hot,
}

impl TempBand {
    pub fn of(temp_c: i32) -> Self {
        match temp_c {
            i32::MIN..=-1 => Self::Freezing,
            0..=9 => Self::Cold,
            10..=19 => Self::Mild,
            20..=29 => Self::Warm,
            _ => Self::Hot,
        }
    }

    fn advice(&self) -> &'static str {
        match self {
            Self::Freezing => "It's bitterly cold out there, bundle up or risk turning into an icicle!",
            Self::Cold => "There's a real chill in the air, so don't leave without a coat.",
            Self::Mild => "Pleasantly mild, perfect for travelling light.",
            Self::Warm => "Lovely weather, let your mood match it!",
            Self::Hot => "Heat alert: stay cool, find some shade and drink plenty of water!",
        }
    }

    fn descriptor(&self) -> &'static str {
        match self {
            Self::Freezing => "freezing",
            Self::Cold => "chilly",
            Self::Mild => "cool",
            Self::Warm => "comfortable",
            Self::Hot => "hot",
        }
    }
}

/// Condition families recognised by keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    Rain,
    Snow,
    Fog,
    Clear,
    Other,
}

impl ConditionKind {
    const KEYWORDS: &'static [(ConditionKind, &'static [&'static str])] = &[
        (ConditionKind::Rain, &["rain", "drizzle", "雨"]),
        (ConditionKind::Snow, &["snow", "sleet", "blizzard", "雪"]),
        (ConditionKind::Fog, &["fog", "mist", "haze", "雾"]),
        (ConditionKind::Clear, &["clear", "sunny", "晴"]),
    ];

    /// First family whose keyword occurs in `text`, checked in declaration order.
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(kind, _)| *kind)
            .unwrap_or(ConditionKind::Other)
    }

    pub fn advice(&self) -> &'static str {
        match self {
            Self::Rain => "Take an umbrella unless you fancy a soaking.",
            Self::Snow => "Snow is falling and roads are slippery, so travel carefully.",
            Self::Fog => "Thick fog about, drive slowly and stay safe.",
            Self::Clear => "Bright skies, a great time to get outside.",
            Self::Other => "The weather is changeable, so be ready for anything.",
        }
    }
}

/// Rule-based narration. Contains the literal city, temperature and condition.
pub fn deterministic_template(request: &BroadcastRequest) -> String {
    let band = TempBand::of(request.temperature_c);
    let kind = ConditionKind::classify(&request.condition);
    format!(
        "{} is currently {}, {}. {} {}",
        request.city,
        request.temperature,
        request.condition,
        band.advice(),
        kind.advice()
    )
}

/// Short greeting-style narration that needs no external call.
pub fn quick_report(city: &str, temp_c: i32, condition: &str, hour: u32) -> String {
    let greeting = match hour {
        0..=5 => "Good night",
        6..=11 => "Good morning",
        12..=17 => "Good afternoon",
        18..=23 => "Good evening",
        _ => "Hello",
    };
    format!(
        "{greeting}! It's {temp_c} degrees in {city} right now, {condition}, feeling {}.",
        TempBand::of(temp_c).descriptor()
    )
}

/// Single-turn text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// OpenAI-compatible chat completions client (DeepSeek by default).
#[derive(Debug, Clone)]
pub struct ChatCompletionsGenerator {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionsGenerator {
    pub fn new(api_key: String, base_url: Option<&str>, narration: &NarrationConfig) -> Self {
        Self {
            http: Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: narration.model.clone(),
            max_tokens: narration.max_tokens,
            temperature: narration.temperature,
        }
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| GenerationError::Parse(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| GenerationError::Parse("no choices".into()))?;

        if text.is_empty() {
            return Err(GenerationError::EmptyContent);
        }
        Ok(text)
    }
}

/// Narration front end. Never fails.
#[derive(Clone)]
pub struct BroadcastTextGenerator {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Option<Duration>,
}

impl BroadcastTextGenerator {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, timeout: Option<Duration>) -> Self {
        Self { generator, timeout }
    }

    /// Without a configured key every narration uses the template.
    pub fn from_config(config: &Config) -> Self {
        let generator = config.provider_api_key(ServiceId::DeepSeek).map(|key| {
            Arc::new(ChatCompletionsGenerator::new(
                key.to_string(),
                config.provider_base_url(ServiceId::DeepSeek),
                &config.narration,
            )) as Arc<dyn TextGenerator>
        });
        Self::new(generator, config.narration.timeout())
    }

    pub async fn generate(&self, snapshot: &WeatherSnapshot) -> String {
        let request = BroadcastRequest::from_snapshot(snapshot);
        match self.try_generate(&request).await {
            Ok(text) => {
                debug!(city = %request.city, "narration generated");
                text
            }
            Err(e) => {
                warn!(error = %e, city = %request.city, "narration generation failed, using template");
                deterministic_template(&request)
            }
        }
    }

    async fn try_generate(&self, request: &BroadcastRequest) -> Result<String, GenerationError> {
        let generator = self.generator.as_ref().ok_or(GenerationError::NotConfigured)?;
        let prompt = request.prompt();

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, generator.complete(&prompt))
                .await
                .map_err(|_| GenerationError::Timeout)?,
            None => generator.complete(&prompt).await,
        }
    }
}
