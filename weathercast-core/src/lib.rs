//! Core library for the `weathercast` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Weather provider abstraction and the weatherapi.com client
//! - The city-selection orchestrator with stale-result rejection
//! - Narration text generation with a rule-based fallback
//! - Speech playback state machine and engines
//! - The durable widget record and its background refresher
//!
//! It is used by `weathercast-cli`, but can also be reused by other binaries or services.

pub mod city;
pub mod config;
pub mod error;
pub mod location;
pub mod model;
pub mod narration;
pub mod orchestrator;
pub mod playback;
pub mod provider;
pub mod scheduler;
pub mod widget;

pub use config::{Config, ProviderConfig};
pub use error::{EngineError, GenerationError, LocationError, PlaybackError, WeatherError};
pub use model::{City, WeatherSnapshot};
pub use narration::BroadcastTextGenerator;
pub use orchestrator::{Phase, WeatherOrchestrator, WeatherState};
pub use playback::{PlaybackController, PlaybackState};
pub use provider::{ServiceId, WeatherProvider};
pub use scheduler::RefreshScheduler;
pub use widget::{PersistedWidgetState, SlotStore, WidgetPublisher};
