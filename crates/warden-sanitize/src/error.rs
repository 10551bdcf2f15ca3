use thiserror::Error;

/// Errors building a sanitizer. Sanitizing itself never fails.
#[derive(Debug, Error)]
pub enum SanitizeError {
    /// A rule's pattern does not compile.
    #[error("redaction rule '{rule}' has an invalid pattern: {source}")]
    InvalidPattern {
        /// Rule name.
        rule: String,
        /// Compile error.
        #[source]
        source: regex::Error,
    },

    /// A rule matches the placeholder, so redaction would never settle.
    #[error("redaction rule '{rule}' matches the placeholder '{placeholder}'")]
    MatchesPlaceholder {
        /// Rule name.
        rule: String,
        /// Configured placeholder.
        placeholder: String,
    },

    /// The placeholder is empty.
    #[error("redaction placeholder must not be empty")]
    EmptyPlaceholder,

    /// `max_passes` is zero.
    #[error("max_passes must be at least 1")]
    NoPasses,
}

/// Result type for sanitizer construction.
pub type SanitizeResult<T> = Result<T, SanitizeError>;
