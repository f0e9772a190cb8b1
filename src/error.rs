//! Error types for the polling coordinator.

use thiserror::Error;

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, PollError>;

/// Errors surfaced by drivers and monitors.
///
/// Cancellation is not represented here: a canceled wait returns `Ok(None)`
/// and a canceled notification loop makes `stop` return `Ok(())`.
#[derive(Debug, Error)]
pub enum PollError {
    /// Construction-time validation failure.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Runtime misuse, e.g. reusing a single-use driver.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The caller-supplied poll function failed.
    #[error("Poll source failed: {0}")]
    Source(#[source] anyhow::Error),

    /// The caller-supplied payload handler failed.
    #[error("Payload handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    /// The worker task did not exit within the configured stop timeout.
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl PollError {
    /// Create a configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid-state error.
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState(message.into())
    }
}
