//! Flow-control settings.

use std::time::Duration;

use crate::error::ConfigError;

/// Settings of the adaptive batch dispatcher.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Lower bound of the acceptable backlog window.
    pub min: u64,
    /// Upper bound of the acceptable backlog window; the per tick quota
    /// is `max - backlog`.
    pub max: u64,
    /// Quota before the first tick.
    pub initial_ratio: u64,
    /// Period of the flow-control tick.
    pub tick_interval: Duration,
    /// Resubmissions allowed per record after transport errors.
    pub max_retries: u32,
    /// Consecutive idle ticks after which a stopping dispatcher gives up on
    /// outstanding responses.
    pub force_shutdown_after_idle_intervals: u32,
    /// Log every record handed to the sink.
    pub verbose: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::with_window(50, 150)
    }
}

impl BatchOptions {
    /// Defaults with a custom `[min, max]` window; the initial quota is its middle.
    pub fn with_window(min: u64, max: u64) -> Self {
        Self {
            min,
            max,
            initial_ratio: min + max.saturating_sub(min) / 2,
            tick_interval: Duration::from_secs(1),
            max_retries: 5,
            force_shutdown_after_idle_intervals: 30,
            verbose: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::Invalid {
                option: "min",
                message: format!("minimal backlog {} exceeds maximal backlog {}", self.min, self.max),
            });
        }
        if self.max == 0 {
            return Err(ConfigError::Invalid {
                option: "max",
                message: "maximal backlog must be positive".to_string(),
            });
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid {
                option: "tick_interval",
                message: "tick interval must be positive".to_string(),
            });
        }
        Ok(())
    }
}
