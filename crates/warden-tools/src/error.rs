//! Registry and validation errors.

use thiserror::Error;

/// Errors raised by the tool registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A tool with this name is already registered.
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    /// No tool with this name is registered.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// The tool definition is unusable.
    #[error("invalid definition for tool '{name}': {reason}")]
    InvalidTool {
        /// Tool name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Why a request's arguments were rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The tool declares no such field.
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// A required field is absent.
    #[error("missing required field '{0}'")]
    MissingField(String),

    /// The value has the wrong JSON type.
    #[error("field '{field}' must be {expected}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Expected type name.
        expected: &'static str,
    },

    /// A string is not one of the allowed values.
    #[error("field '{field}' must be one of: {allowed}")]
    NotAllowed {
        /// Field name.
        field: String,
        /// Comma-separated allowed values.
        allowed: String,
    },

    /// A string exceeds its maximum length.
    #[error("field '{field}' exceeds {max} characters")]
    TooLong {
        /// Field name.
        field: String,
        /// Maximum length.
        max: usize,
    },

    /// An integer is outside its bounds.
    #[error("field '{field}' must be between {min} and {max}")]
    OutOfRange {
        /// Field name.
        field: String,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },

    /// A timeout override exceeds the tool's own budget.
    #[error("timeout_seconds {requested} exceeds the tool limit of {limit}")]
    TimeoutTooLong {
        /// Requested seconds.
        requested: i64,
        /// Tool budget in seconds.
        limit: u64,
    },

    /// A string contains a shell or control metacharacter.
    #[error("field '{field}' contains forbidden character {found:?}")]
    ForbiddenCharacter {
        /// Field name.
        field: String,
        /// The offending character.
        found: char,
    },

    /// A string starts with `-` and would be read as an option.
    #[error("field '{0}' must not start with '-'")]
    OptionInjection(String),
}

/// Result type for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;
