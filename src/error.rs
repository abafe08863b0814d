// Error taxonomy for the signal engine
// Absence of a signal is NOT an error - cycles that produce nothing return Ok

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Telemetry is missing, stale, or the window is too short. The cycle is
    /// skipped, no state is mutated and no signal is emitted.
    #[error("telemetry unavailable for {instrument}: {reason}")]
    DataUnavailable { instrument: String, reason: String },

    /// A derived numeric value fell outside its documented invariant range
    /// (e.g. a negative stop distance). The offending candidate is aborted,
    /// never clamped silently.
    #[error("computation invalid: {0}")]
    ComputationInvalid(String),

    /// The telemetry collaborator throttled us. Triggers backoff and a cycle
    /// skip, not a crash.
    #[error("rate limited by telemetry collaborator")]
    RateLimited { retry_after: Option<Duration> },

    #[error("config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EngineError {
    pub fn unavailable(instrument: &str, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            instrument: instrument.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_data_unavailable(&self) -> bool {
        matches!(self, Self::DataUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
