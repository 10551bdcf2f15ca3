//! Telemetry errors.

use thiserror::Error;

/// Why logging could not be set up.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A level, directive, format or target was not understood.
    #[error("invalid logging config: {0}")]
    ConfigError(String),

    /// The global subscriber could not be installed, usually because one
    /// already is.
    #[error("cannot install log subscriber: {0}")]
    InitError(String),

    /// The log directory could not be created.
    #[error("log directory: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
