use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("config file {} does not exist", path.display())]
    Missing {
        /// The requested path.
        path: PathBuf,
    },

    /// A file exists but could not be read.
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        /// The file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A layer is not valid TOML or does not fit the schema.
    #[error("malformed config in {origin}: {source}")]
    Parse {
        /// File path, `<inline>` or `<embedded defaults>`.
        origin: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// The merged configuration breaks a cross-field rule.
    #[error("invalid config at {field}: {message}")]
    Invalid {
        /// Dotted field path, e.g. `roles.viewer.tools`.
        field: String,
        /// What is wrong.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
