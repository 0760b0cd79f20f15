//! Background refresh of the display-surface record.
//!
//! Independent of any interactive session. The timer starts from zero on every
//! process start; nothing about the next due time is persisted.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{error, info, warn};

use crate::{
    city,
    config::Config,
    provider::WeatherProvider,
    widget::{PersistedWidgetState, SlotStore, WidgetPublisher},
};

pub struct RefreshScheduler {
    provider: Arc<dyn WeatherProvider>,
    publisher: WidgetPublisher,
    default_city: String,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        publisher: WidgetPublisher,
        default_city: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            provider,
            publisher,
            default_city: default_city.into(),
            interval,
        }
    }

    pub fn from_config(cfg: &Config, provider: Arc<dyn WeatherProvider>) -> Result<Self> {
        let publisher = WidgetPublisher::new(SlotStore::from_config(cfg)?);
        Ok(Self::new(
            provider,
            publisher,
            cfg.default_city.clone(),
            cfg.widget.refresh_interval(),
        ))
    }

    fn target_city(&self) -> String {
        match self.publisher.selected_city() {
            Ok(Some(city)) => city,
            Ok(None) => self.default_city.clone(),
            Err(e) => {
                warn!(error = %e, "unreadable city selection, using default");
                self.default_city.clone()
            }
        }
    }

    /// Fetch current conditions once and overwrite the record, or write an
    /// error marker. Only fails if the record itself cannot be written.
    pub async fn refresh_once(&self) -> Result<PersistedWidgetState> {
        let city = self.target_city();
        let query = city::normalize(&city);

        match self.provider.current(query).await {
            Ok(snapshot) => {
                let record = self.publisher.publish_snapshot(&snapshot)?;
                info!(city = %record.city_name, temperature = %record.temperature, "widget refreshed");
                Ok(record)
            }
            Err(e) => {
                warn!(%city, error = %e, "widget refresh failed");
                self.publisher.publish_error(&city, &e.to_string())
            }
        }
    }

    /// Refresh immediately, then on every interval until `shutdown` turns true
    /// or its sender goes away. Returns the number of refreshes attempted.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts = 0;

        info!(interval_secs = self.interval.as_secs(), "refresh scheduler started");
        while !*shutdown.borrow_and_update() {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    attempts += 1;
                    if let Err(e) = self.refresh_once().await {
                        error!(error = %e, "failed to write widget record");
                    }
                }
            }
        }

        info!(attempts, "refresh scheduler stopped");
        attempts
    }
}
