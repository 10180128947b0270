//! Structured error types for methodbeat
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Nothing here is ever surfaced to an instrumented call site; these come out
//! of construction and the monitoring-client API only.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TracerError {
    #[error("Event buffer has been released, tracing cannot start")]
    BufferReleased,

    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Buffer capacity must be at least 1 slot")]
    ZeroCapacity,

    #[error("Time update cycle must be at least 1ms")]
    ZeroCycle,

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_released_display() {
        let err = TracerError::BufferReleased;
        assert!(err.to_string().contains("released"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: TracerError = ConfigError::ZeroCapacity.into();
        assert_eq!(err.to_string(), "Buffer capacity must be at least 1 slot");
    }

    #[test]
    fn test_thread_spawn_names_thread() {
        let err = TracerError::ThreadSpawn {
            name: "methodbeat-time",
            source: std::io::Error::other("out of threads"),
        };
        assert!(err.to_string().contains("methodbeat-time"));
        assert!(err.to_string().contains("out of threads"));
    }
}
