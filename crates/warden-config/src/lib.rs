#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Layered configuration for the Warden gateway.
//!
//! This crate provides a single [`Config`] type covering the protocol
//! server, logging, sandbox limits, audit storage, sanitizer rules, roles,
//! principals and the tool catalogue.
//!
//! # Usage
//!
//! ```rust,no_run
//! use warden_config::Config;
//!
//! let resolved = Config::load(None).unwrap();
//! println!("{} tools configured", resolved.config.tools.len());
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Explicit** (`--config <path>`)
//! 2. **System** (`/etc/warden/config.toml`)
//! 3. **Environment variables** (`WARDEN_*`), fallback only
//! 4. **Embedded defaults** (`defaults.toml` compiled into binary)
//!
//! # Design
//!
//! This crate has **no dependencies on other internal warden crates**.
//! Conversion from config types to domain types happens in the gateway's
//! bridge module.

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layered configuration merging with source tracking.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{LoadOptions, ResolvedConfig};
pub use merge::ConfigLayer;
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// See [`loader::load`] for the full algorithm.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load(explicit_path: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(explicit_path)
    }

    /// Parse a TOML overlay on top of the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the overlay is malformed or the result
    /// fails validation.
    pub fn from_toml_str(overlay: &str) -> ConfigResult<Self> {
        loader::load_str(overlay)
    }
}
