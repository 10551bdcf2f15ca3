//! Warden Core - Foundation types shared by every gateway component.
//!
//! This crate provides:
//! - Identifiers (`CorrelationId`, `PrincipalId`) and the `Principal` type
//! - The execution request/result pair passed through the gateway pipeline
//! - The stable, caller-visible [`ErrorCode`] set
//! - UTF-8 safe truncation helpers
//!
//! # Example
//!
//! ```
//! use warden_core::{ExecutionRequest, ExecutionStatus, Principal};
//!
//! let request = ExecutionRequest::new(
//!     "kubernetes_get",
//!     serde_json::Map::new(),
//!     Principal::new("alice").with_role("viewer"),
//! );
//! assert_eq!(request.tool_name, "kubernetes_get");
//! assert!(ExecutionStatus::Denied.is_pre_execution());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod execution;
pub mod types;
pub mod utils;

pub use execution::{ErrorCode, ExecutionRequest, ExecutionResult, ExecutionStatus};
pub use types::{Arguments, CorrelationId, Principal, PrincipalId, Timestamp};
pub use utils::truncate_to_boundary;
