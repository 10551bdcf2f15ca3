//! Warden Audit - append-only, hash-chained record of every call.
//!
//! This crate provides:
//! - [`AuditRecord`]s carrying a gapless sequence number and a BLAKE3 hash
//!   chain over their contents
//! - In-memory and JSON-lines file storage
//! - Lazy, restartable [`AuditQuery`]s
//! - Chain verification
//!
//! Arguments are never stored, only their digest.
//!
//! # Example
//!
//! ```
//! use warden_audit::{AuditDraft, AuditFilter, AuditLog};
//! use warden_core::{Arguments, CorrelationId, ExecutionStatus, PrincipalId};
//!
//! let log = AuditLog::in_memory();
//! let sequence = log
//!     .append(AuditDraft::new(
//!         CorrelationId::new(),
//!         PrincipalId::new("alice"),
//!         "kubernetes_get",
//!         &Arguments::new(),
//!         ExecutionStatus::Completed,
//!     ))
//!     .unwrap();
//! assert_eq!(sequence, 1);
//!
//! let records = log.query(AuditFilter::new().principal("alice")).to_vec().unwrap();
//! assert_eq!(records.len(), 1);
//! assert!(log.verify().unwrap().valid);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod log;
mod query;
mod record;
mod storage;

pub use error::{AuditError, AuditResult};
pub use log::{AuditLog, ChainIssue, ChainVerification};
pub use query::{AuditFilter, AuditQuery, AuditQueryIter};
pub use record::{AuditDraft, AuditRecord, arguments_digest, zero_hash};
pub use storage::{AuditStorage, FileStorage, MemoryStorage};
