use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{location::Fix, provider::ServiceId};

/// Credentials and endpoint override for one external service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    /// Overrides the service's public endpoint (mock servers, proxies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Narration generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Bound on the single generation call. Absent means wait indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            max_tokens: 200,
            temperature: 0.7,
            timeout_secs: None,
        }
    }
}

impl NarrationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Console,
    Command,
}

/// Speech engine selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub engine: EngineKind,
    /// External TTS program used by the `command` engine.
    pub program: String,
    pub args: Vec<String>,
    /// Pace of the `console` engine.
    pub words_per_minute: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Console,
            program: "espeak-ng".to_string(),
            args: Vec::new(),
            words_per_minute: 180,
        }
    }
}

/// Device location inputs.
///
/// Example TOML:
/// [location]
/// permission_granted = true
/// precise = { lat = 39.9042, lon = 116.4074 }
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub permission_granted: bool,
    /// Last fix cached by a satellite-grade source.
    pub precise: Option<Fix>,
    /// Last fix cached by a network-grade source.
    pub coarse: Option<Fix>,
    pub geocoder_url: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            permission_granted: false,
            precise: None,
            coarse: None,
            geocoder_url: crate::location::NOMINATIM_URL.to_string(),
        }
    }
}

/// Passive display surface refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    pub refresh_interval_secs: u64,
    /// Where the durable slots live. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30 * 60,
            data_dir: None,
        }
    }
}

impl WidgetConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// City shown when nothing was selected yet.
    pub default_city: String,

    pub forecast_days: u8,

    /// Example TOML:
    /// [providers.weatherapi]
    /// api_key = "..."
    pub providers: HashMap<String, ProviderConfig>,

    pub narration: NarrationConfig,
    pub speech: SpeechConfig,
    pub location: LocationConfig,
    pub widget: WidgetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_city: "北京".to_string(),
            forecast_days: 7,
            providers: HashMap::new(),
            narration: NarrationConfig::default(),
            speech: SpeechConfig::default(),
            location: LocationConfig::default(),
            widget: WidgetConfig::default(),
        }
    }
}

impl Config {
    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "weathercast", "weathercast")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory holding the durable display-surface slots.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.widget.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.data_dir().to_path_buf()),
        }
    }

    /// Set or replace a service API key, keeping any base URL override.
    pub fn upsert_provider_api_key(&mut self, service: ServiceId, api_key: String) {
        self.providers
            .entry(service.as_str().to_string())
            .and_modify(|cfg| cfg.api_key = api_key.clone())
            .or_insert(ProviderConfig {
                api_key,
                base_url: None,
            });
    }

    pub fn provider_config(&self, service: ServiceId) -> Option<&ProviderConfig> {
        self.providers.get(service.as_str())
    }

    /// Returns API key for a service, if present.
    pub fn provider_api_key(&self, service: ServiceId) -> Option<&str> {
        self.provider_config(service).map(|cfg| cfg.api_key.as_str())
    }

    pub fn provider_base_url(&self, service: ServiceId) -> Option<&str> {
        self.provider_config(service).and_then(|cfg| cfg.base_url.as_deref())
    }

    pub fn is_provider_configured(&self, service: ServiceId) -> bool {
        self.provider_api_key(service).is_some()
    }

    /// API key or an actionable error.
    pub fn require_api_key(&self, service: ServiceId) -> Result<&str> {
        self.provider_api_key(service).ok_or_else(|| {
            anyhow!(
                "No API key configured for provider '{service}'.\n\
                 Hint: run `weathercast configure {service}` and enter your API key."
            )
        })
    }
}
