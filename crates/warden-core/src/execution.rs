//! Execution request/result types passed through the gateway pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Arguments, CorrelationId, Principal, Timestamp};

/// A proposed tool invocation, as received by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Name of the tool to invoke.
    pub tool_name: String,
    /// Caller-supplied arguments.
    pub arguments: Arguments,
    /// Who is asking.
    pub principal: Principal,
    /// Unique id of this call.
    pub correlation_id: CorrelationId,
    /// When the dispatcher received the call.
    pub received_at: Timestamp,
}

impl ExecutionRequest {
    /// Create a request with a fresh correlation id, received now.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, arguments: Arguments, principal: Principal) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            principal,
            correlation_id: CorrelationId::new(),
            received_at: Timestamp::now(),
        }
    }

    /// Use a caller-supplied correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = id;
        self
    }
}

/// Final status of one pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Executed and the underlying operation succeeded.
    Completed,
    /// Executed, exceeded its budget, process reaped.
    TimedOut,
    /// Executed, the underlying operation returned an error.
    Failed,
    /// Executed, cancelled by an operator.
    Cancelled,
    /// Policy forbids the call. Never executed.
    Denied,
    /// Malformed or unsafe request. Never executed.
    Rejected,
    /// The sandbox was at capacity. Never executed.
    Backpressure,
    /// Unexpected fault inside the gateway.
    InternalError,
}

impl ExecutionStatus {
    /// Whether the pipeline stopped before reaching the sandbox.
    #[must_use]
    pub fn is_pre_execution(self) -> bool {
        matches!(
            self,
            Self::Denied | Self::Rejected | Self::Backpressure | Self::InternalError
        )
    }

    /// Stable string form used in responses and audit records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::TimedOut => "TimedOut",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::Denied => "Denied",
            Self::Rejected => "Rejected",
            Self::Backpressure => "Backpressure",
            Self::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable, caller-visible error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The request was malformed or unsafe.
    ValidationError,
    /// The principal may not make this call.
    AuthorizationError,
    /// No tool with the requested name is registered.
    UnknownTool,
    /// The execution exceeded its time budget.
    ExecutionTimeout,
    /// The underlying operation failed or was cancelled.
    ExecutionFailure,
    /// The gateway is at capacity.
    Backpressure,
    /// Unexpected gateway fault.
    InternalError,
    /// The envelope was not valid JSON-RPC.
    ParseError,
    /// The envelope named an unsupported method.
    MethodNotFound,
}

impl ErrorCode {
    /// Stable string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::AuthorizationError => "AuthorizationError",
            Self::UnknownTool => "UnknownTool",
            Self::ExecutionTimeout => "ExecutionTimeout",
            Self::ExecutionFailure => "ExecutionFailure",
            Self::Backpressure => "Backpressure",
            Self::InternalError => "InternalError",
            Self::ParseError => "ParseError",
            Self::MethodNotFound => "MethodNotFound",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one pipeline invocation.
///
/// `error` is present iff `status` is not [`ExecutionStatus::Completed`].
/// `sanitized_output` is only ever derived from `raw_output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Final status.
    pub status: ExecutionStatus,
    /// Unsanitized output captured from the operation. Never leaves the gateway.
    #[serde(skip)]
    pub raw_output: String,
    /// Output after redaction.
    pub sanitized_output: String,
    /// Wall-clock time from pipeline start to finish.
    pub duration_ms: u64,
    /// Sanitized error message.
    pub error: Option<String>,
    /// Stable error code, when `status` is not `Completed`.
    pub code: Option<ErrorCode>,
    /// Process exit code, when the operation ran to completion.
    pub exit_code: Option<i32>,
    /// Whether captured output hit the size ceiling.
    pub truncated: bool,
    /// Number of redactions applied to the output.
    pub redaction_count: usize,
}

impl ExecutionResult {
    /// A result for a call that never reached the sandbox.
    #[must_use]
    pub fn refused(status: ExecutionStatus, code: ErrorCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            raw_output: String::new(),
            sanitized_output: String::new(),
            duration_ms: 0,
            error: Some(reason.into()),
            code: Some(code),
            exit_code: None,
            truncated: false,
            redaction_count: 0,
        }
    }

    /// Whether the call completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// Set the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}
