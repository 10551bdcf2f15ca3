//! Audit-related error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur with audit logging.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Reading or writing the log file failed.
    #[error("audit log I/O error on {path}: {source}")]
    Io {
        /// Log file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The log file contains a line that is not a record.
    #[error("corrupt audit log {path} at line {line}: {reason}")]
    Corrupt {
        /// Log file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What is wrong.
        reason: String,
    },

    /// Storage backend failure not tied to a file.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
