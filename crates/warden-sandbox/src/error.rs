//! Sandbox error types.

use thiserror::Error;
use warden_core::CorrelationId;

/// Reasons the sandbox refused to run a call.
///
/// Failures of the process itself are not errors: they are reported as
/// `Failed`, `TimedOut` or `Cancelled` results.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Every execution slot is busy.
    #[error("execution capacity exhausted: {0}")]
    Backpressure(String),

    /// A call with this correlation id is already in flight.
    #[error("correlation id {0} is already executing")]
    DuplicateExecution(CorrelationId),

    /// Validated arguments did not fill the tool's argument templates.
    #[error("argument template references missing field '{0}'")]
    Render(String),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;
