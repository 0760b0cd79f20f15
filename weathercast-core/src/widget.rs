//! Durable display-surface record.
//!
//! Each slot is a whole JSON document under the data directory. Writes go to
//! a temp file that is renamed over the slot, so readers see either the old
//! record or the new one, never a mix. Last write wins.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{config::Config, model::WeatherSnapshot};

pub const WIDGET_SLOT: &str = "weather_widget";
pub const SELECTION_SLOT: &str = "selected_city";

/// `last_update` value written alongside an error marker.
pub const ERROR_TIMESTAMP: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetStatus {
    #[default]
    Fresh,
    /// The last refresh failed; the rest of the record is stale.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedWidgetState {
    pub city_name: String,
    pub temperature: String,
    pub description: String,
    /// Local `HH:MM`, or [`ERROR_TIMESTAMP`].
    #[serde(rename = "lastUpdateTimestamp")]
    pub last_update: String,
    #[serde(default)]
    pub status: WidgetStatus,
}

impl PersistedWidgetState {
    pub fn from_snapshot(snapshot: &WeatherSnapshot, at: DateTime<Local>) -> Self {
        Self {
            city_name: snapshot.location.name.clone(),
            temperature: snapshot.temp_whole_c().to_string(),
            description: snapshot.current.condition.text.clone(),
            last_update: at.format("%H:%M").to_string(),
            status: WidgetStatus::Fresh,
        }
    }

    /// Marker for a failed refresh. Keeps whatever city and temperature the
    /// surface showed before so it can still render something.
    pub fn error_marker(previous: Option<&Self>, city: &str, reason: &str) -> Self {
        Self {
            city_name: previous.map_or_else(|| city.to_string(), |p| p.city_name.clone()),
            temperature: previous.map(|p| p.temperature.clone()).unwrap_or_default(),
            description: reason.to_string(),
            last_update: ERROR_TIMESTAMP.to_string(),
            status: WidgetStatus::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == WidgetStatus::Error
    }

    /// One-line rendering for text surfaces.
    pub fn headline(&self) -> String {
        let temp = if self.temperature.is_empty() {
            "--".to_string()
        } else {
            format!("{}°C", self.temperature)
        };
        match self.status {
            WidgetStatus::Fresh => format!(
                "{} {} {} (updated {})",
                self.city_name, temp, self.description, self.last_update
            ),
            WidgetStatus::Error => format!(
                "{} {} (stale: {})",
                self.city_name, temp, self.description
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Selection {
    city: String,
}

/// Directory of named JSON slots.
#[derive(Debug, Clone)]
pub struct SlotStore {
    dir: PathBuf,
}

impl SlotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(cfg.data_dir()?))
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.json"))
    }

    /// `Ok(None)` when the slot was never written.
    pub fn read<T: DeserializeOwned>(&self, slot: &str) -> Result<Option<T>> {
        let path = self.slot_path(slot);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read slot file: {}", path.display()))?;
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse slot file: {}", path.display()))?;
        Ok(Some(value))
    }

    pub fn write<T: Serialize>(&self, slot: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create data directory: {}", self.dir.display()))?;

        let path = self.slot_path(slot);
        let tmp = self.dir.join(format!(".{slot}.json.tmp"));
        let json = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize slot '{slot}'"))?;

        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write temp file: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace slot file: {}", path.display()))?;

        debug!(slot, path = %path.display(), "slot written");
        Ok(())
    }
}

/// Writer shared by the interactive session and the background refresher.
#[derive(Debug, Clone)]
pub struct WidgetPublisher {
    store: SlotStore,
}

impl WidgetPublisher {
    pub fn new(store: SlotStore) -> Self {
        Self { store }
    }

    pub fn current(&self) -> Result<Option<PersistedWidgetState>> {
        self.store.read(WIDGET_SLOT)
    }

    pub fn publish_snapshot(&self, snapshot: &WeatherSnapshot) -> Result<PersistedWidgetState> {
        let record = PersistedWidgetState::from_snapshot(snapshot, Local::now());
        self.store.write(WIDGET_SLOT, &record)?;
        Ok(record)
    }

    pub fn publish_error(&self, city: &str, reason: &str) -> Result<PersistedWidgetState> {
        // An unreadable previous record is replaced like a missing one.
        let previous = self.current().unwrap_or_default();
        let record = PersistedWidgetState::error_marker(previous.as_ref(), city, reason);
        self.store.write(WIDGET_SLOT, &record)?;
        Ok(record)
    }

    pub fn remember_selection(&self, city: &str) -> Result<()> {
        self.store.write(
            SELECTION_SLOT,
            &Selection {
                city: city.to_string(),
            },
        )
    }

    pub fn selected_city(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .read::<Selection>(SELECTION_SLOT)?
            .map(|selection| selection.city))
    }
}
