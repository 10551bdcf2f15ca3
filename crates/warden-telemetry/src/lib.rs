//! Warden Telemetry - Logging and per-call tracing context.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats and targets
//! - Request context carrying the correlation id of a tool call
//!
//! Logs default to stderr: stdout carries the protocol stream.
//!
//! # Example
//!
//! ```rust,no_run
//! use warden_telemetry::{LogConfig, LogFormat, setup_logging, RequestContext};
//!
//! # fn main() -> Result<(), warden_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Json)
//!     .with_directive("warden_sandbox=trace");
//!
//! setup_logging(&config)?;
//!
//! let ctx = RequestContext::new("call_tool")
//!     .with_correlation_id("req-1")
//!     .with_tool("kubernetes_get");
//!
//! let span = ctx.span();
//! let _guard = span.enter();
//! tracing::info!("Processing call");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::RequestContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{FileRotation, LogConfig, LogFormat, LogTarget, setup_logging};
