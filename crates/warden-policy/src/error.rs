//! Policy error types.

use thiserror::Error;

/// Errors building a role set.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A namespace pattern is not a valid glob.
    #[error("role '{role}' has invalid namespace pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Role name.
        role: String,
        /// The offending pattern.
        pattern: String,
        /// Underlying glob error.
        #[source]
        source: globset::Error,
    },

    /// The principal directory names a role that does not exist.
    #[error("principal '{principal}' is mapped to unknown role '{role}'")]
    UnknownRole {
        /// Principal id.
        principal: String,
        /// Missing role name.
        role: String,
    },
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
