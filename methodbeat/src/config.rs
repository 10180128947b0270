//! Tracer configuration
//!
//! All values are fixed at construction. Nothing here can be changed on a
//! running tracer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{ConfigError, ThreadId};

/// Default number of event slots (8 MB of packed records)
pub const DEFAULT_BUFFER_CAPACITY: usize = 1_000_000;

/// Default period of the background offset refresh
pub const DEFAULT_TIME_UPDATE_CYCLE_MS: u64 = 5;

/// Default delay after construction before an unused tracer frees itself
pub const DEFAULT_RELEASE_BUFFER_DELAY_MS: u64 = 15_000;

/// Default delay after bring-up before an unstarted tracer expires
pub const DEFAULT_START_EXPIRE_DELAY_MS: u64 = 15_000;

/// Default duration above which a call is reported as an evil method
pub const DEFAULT_EVIL_METHOD_THRESHOLD_MS: u64 = 700;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Event slots in the circular buffer
    pub buffer_capacity: usize,
    /// Refresh period of the cached time offset
    pub time_update_cycle_ms: u64,
    /// Idle window after which a never-used tracer releases its resources
    pub release_buffer_delay_ms: u64,
    /// Window after bring-up in which `start()` is expected to be called
    pub start_expire_delay_ms: u64,
    /// Evil-method threshold handed to consumers
    pub evil_method_threshold_ms: u64,
    /// When set, only calls reported from this thread are recorded
    pub loop_thread: Option<ThreadId>,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            time_update_cycle_ms: DEFAULT_TIME_UPDATE_CYCLE_MS,
            release_buffer_delay_ms: DEFAULT_RELEASE_BUFFER_DELAY_MS,
            start_expire_delay_ms: DEFAULT_START_EXPIRE_DELAY_MS,
            evil_method_threshold_ms: DEFAULT_EVIL_METHOD_THRESHOLD_MS,
            loop_thread: None,
        }
    }
}

impl TracerConfig {
    /// Reject values that would leave the tracer unable to record or spin
    /// the refresh thread without sleeping.
    ///
    /// # Errors
    /// The first offending field, as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.time_update_cycle_ms == 0 {
            return Err(ConfigError::ZeroCycle);
        }
        if self.evil_method_threshold_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "evil_method_threshold_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn time_update_cycle(&self) -> Duration {
        Duration::from_millis(self.time_update_cycle_ms)
    }

    #[must_use]
    pub fn release_buffer_delay(&self) -> Duration {
        Duration::from_millis(self.release_buffer_delay_ms)
    }

    #[must_use]
    pub fn start_expire_delay(&self) -> Duration {
        Duration::from_millis(self.start_expire_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TracerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_capacity, 1_000_000);
        assert_eq!(config.time_update_cycle(), Duration::from_millis(5));
        assert_eq!(config.evil_method_threshold_ms, 700);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = TracerConfig { buffer_capacity: 0, ..TracerConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn test_zero_cycle_rejected() {
        let config = TracerConfig { time_update_cycle_ms: 0, ..TracerConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCycle));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: TracerConfig =
            serde_json::from_str(r#"{"buffer_capacity": 64, "loop_thread": 1}"#).unwrap();
        assert_eq!(config.buffer_capacity, 64);
        assert_eq!(config.loop_thread, Some(ThreadId(1)));
        assert_eq!(config.start_expire_delay_ms, DEFAULT_START_EXPIRE_DELAY_MS);
    }
}
