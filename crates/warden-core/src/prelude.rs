//! Prelude module - commonly used types for convenient import.
//!
//! Use `use warden_core::prelude::*;` to import all essential types.

// Identity and ids
pub use crate::{Arguments, CorrelationId, Principal, PrincipalId, Timestamp};

// Execution pipeline
pub use crate::{ErrorCode, ExecutionRequest, ExecutionResult, ExecutionStatus};
