#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Tool registry and request validation for the Warden gateway.
//!
//! A [`Tool`] couples an input schema with an argv [`Invocation`]. The
//! [`ToolRegistry`] serves lock-free snapshots of the catalogue and swaps in
//! a new one on reload. [`validate`] checks call arguments against a tool's
//! schema and screens strings before anything is executed.

mod error;
mod registry;
mod schema;
mod template;
mod tool;
mod validator;

pub mod prelude;

pub use error::{RegistryError, RegistryResult, ValidationError, ValidationResult};
pub use registry::{Catalogue, ToolRegistry};
pub use schema::{FieldSpec, FieldType, InputSchema};
pub use template::{ArgTemplate, CommandLine, Invocation};
pub use tool::{TIMEOUT_OVERRIDE_FIELD, Tool};
pub use validator::{timeout_override, validate};
