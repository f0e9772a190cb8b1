//! Driver timing configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PollError, Result};

/// Timing parameters for a [`PollDriver`](crate::PollDriver).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Upper bound on the idle sleep between empty polls, in milliseconds.
    /// No individual sleep ever exceeds this.
    pub max_idle_delay_ms: u64,
    /// How long `stop` waits for the worker task to exit, in milliseconds.
    pub stop_timeout_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_idle_delay_ms: 500,
            stop_timeout_ms: 5_000,
        }
    }
}

impl PollerConfig {
    /// Default configuration with the given idle-delay cap.
    pub fn with_max_idle_delay_ms(max_idle_delay_ms: u64) -> Self {
        Self {
            max_idle_delay_ms,
            ..Self::default()
        }
    }

    pub fn max_idle_delay(&self) -> Duration {
        Duration::from_millis(self.max_idle_delay_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if self.max_idle_delay_ms == 0 {
            return Err(PollError::config("max_idle_delay_ms must be greater than 0"));
        }

        if self.stop_timeout_ms == 0 {
            return Err(PollError::config("stop_timeout_ms must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PollerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_idle_delay(), Duration::from_millis(500));
    }

    #[test]
    fn zero_idle_delay_is_rejected() {
        let config = PollerConfig::with_max_idle_delay_ms(0);
        assert!(matches!(
            config.validate(),
            Err(PollError::Configuration { .. })
        ));
    }

    #[test]
    fn zero_stop_timeout_is_rejected() {
        let config = PollerConfig {
            stop_timeout_ms: 0,
            ..PollerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
