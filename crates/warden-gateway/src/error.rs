//! Error types for the gateway.

use thiserror::Error;

/// Gateway error type.
///
/// These are startup and reload failures. Per-call failures never surface
/// as errors; they become [`warden_core::ExecutionResult`]s.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] warden_config::ConfigError),

    /// A tool definition was rejected.
    #[error("tool error: {0}")]
    Registry(#[from] warden_tools::RegistryError),

    /// A role definition was rejected.
    #[error("policy error: {0}")]
    Policy(#[from] warden_policy::PolicyError),

    /// A redaction rule was rejected.
    #[error("sanitizer error: {0}")]
    Sanitize(#[from] warden_sanitize::SanitizeError),

    /// The audit log could not be opened.
    #[error("audit error: {0}")]
    Audit(#[from] warden_audit::AuditError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
