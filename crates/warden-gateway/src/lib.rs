#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! The Warden gateway.
//!
//! Accepts line-delimited JSON-RPC 2.0 requests, runs every `call_tool`
//! through validation, authorization, sandboxed execution, sanitization
//! and audit, and answers with a sanitized result.
//!
//! ```no_run
//! # async fn demo() -> Result<(), warden_gateway::GatewayError> {
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use warden_config::Config;
//! use warden_gateway::{Dispatcher, Gateway, serve_stdio};
//!
//! let cfg = Config::load(None)?.config;
//! let gateway = Arc::new(Gateway::from_config(&cfg)?);
//! let dispatcher = Arc::new(Dispatcher::new(gateway, cfg.server.max_request_bytes));
//! serve_stdio(dispatcher, CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config_bridge;
mod dispatcher;
mod error;
mod gateway;
mod middleware;
mod server;

pub use dispatcher::{Dispatcher, PROTOCOL_VERSION, UNKNOWN_PRINCIPAL, render_result};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{Definitions, Gateway};
pub use middleware::{CallContext, MetricsMiddleware, MetricsSnapshot, Middleware, TracingMiddleware};
pub use server::{serve, serve_stdio};
