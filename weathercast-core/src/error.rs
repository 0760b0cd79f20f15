//! Error taxonomy shared by the core components.
//!
//! Each concern gets its own enum so callers can handle failures exhaustively:
//! weather fetches surface to the user, generation errors never leave the
//! narration generator, and playback errors leave the controller usable.

/// Weather provider failures.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Weather provider returned status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("Failed to parse weather provider response: {0}")]
    Parse(String),
}

/// Device location failures, in the order the lookup can hit them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location permission not granted")]
    NoPermission,
    #[error("no enabled location provider")]
    NoProvider,
    #[error("no last-known position available")]
    NoFix,
    #[error("reverse geocoding is not available")]
    GeocodeUnavailable,
    #[error("reverse geocoding failed: {0}")]
    GeocodeFailed(String),
}

/// Text-generation failures. Always resolved by the deterministic fallback.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("generation service returned status {0}")]
    Status(u16),
    #[error("unexpected generation response shape: {0}")]
    Parse(String),
    #[error("generation service returned empty text")]
    EmptyContent,
    #[error("generation timed out")]
    Timeout,
    #[error("no generation service configured")]
    NotConfigured,
}

/// Speech engine failures, reported by the engine implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

/// Playback controller outcomes that are not a plain success.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("speech engine failed to initialize: {0}")]
    InitFailed(String),
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("operation `{operation}` not allowed while {state}")]
    Rejected {
        operation: &'static str,
        state: &'static str,
    },
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
