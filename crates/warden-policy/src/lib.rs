#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Role-based authorization for the Warden gateway.
//!
//! A [`RoleSet`] maps role names to allowed tools and namespace globs, plus
//! the principal directory that alone decides each caller's role. The
//! [`PolicyEngine`] answers `authorize` from a lock-free snapshot and swaps
//! in a new set on reload. Everything not explicitly allowed is denied.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use warden_policy::{Role, RoleSet, decide, Decision, DenyReason};
//! # use std::time::Duration;
//! # use warden_tools::{InputSchema, Invocation, Tool};
//! # let delete = Tool::new("kubernetes_delete", "", InputSchema::default(),
//! #     Duration::from_secs(5), Invocation::new("true", &[] as &[&str], None).unwrap()).unwrap();
//!
//! let roles = RoleSet::new(
//!     1,
//!     vec![Role::new("viewer", ["kubernetes_get"], ["default"]).unwrap()],
//!     BTreeMap::from([("carol".to_owned(), "viewer".to_owned())]),
//! )
//! .unwrap();
//!
//! let viewer = warden_core::Principal::new("carol");
//! let decision = decide(&roles, &viewer, &delete, &Default::default());
//! assert_eq!(decision, Decision::Deny(DenyReason::ToolNotPermitted));
//! ```

mod engine;
mod error;
mod role;

pub use engine::{Decision, DenyReason, PolicyEngine, decide};
pub use error::{PolicyError, PolicyResult};
pub use role::{Role, RoleSet};
