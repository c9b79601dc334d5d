//! Telemetry error types.

use thiserror::Error;

/// Errors from logging setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The global subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    InitError(String),

    /// The logging configuration is invalid.
    #[error("invalid logging configuration: {0}")]
    ConfigError(String),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
