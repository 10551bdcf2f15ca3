#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Bounded process execution for the Warden gateway.
//!
//! Each call runs as a child process spawned from an argv vector in its own
//! process group, with a cleared environment. A wall-clock budget, a
//! per-stream output ceiling and a concurrency ceiling bound every call.
//! Expired or cancelled calls get SIGTERM, a grace period, then SIGKILL to
//! the whole group; a drop guard covers every other exit path.
//!
//! ```no_run
//! # async fn demo(tool: &warden_tools::Tool) -> Result<(), warden_sandbox::SandboxError> {
//! use warden_core::{Arguments, CorrelationId};
//! use warden_sandbox::{Sandbox, SandboxConfig};
//!
//! let sandbox = Sandbox::new(SandboxConfig::default());
//! let args = Arguments::new();
//! let budget = sandbox.budget_for(tool, &args);
//! let result = sandbox.execute(tool, &args, budget, &CorrelationId::new()).await?;
//! println!("{}", result.status);
//! # Ok(())
//! # }
//! ```

mod error;
mod journal;
mod limiter;
mod process;
mod sandbox;

pub use error::{SandboxError, SandboxResult};
pub use journal::{ExecutionState, JournalEntry};
pub use limiter::{ConcurrencyLimiter, Overflow};
pub use sandbox::{Sandbox, SandboxConfig};
