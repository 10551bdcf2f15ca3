//! Logging configuration and subscriber installation.
//!
//! Stdout belongs to the protocol stream while the gateway serves, so the
//! default target is stderr and [`LogConfig::protocol_safe`] moves a
//! configured stdout target there.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{TelemetryError, TelemetryResult};

/// How often a file target starts a new file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    /// A new file each day.
    #[default]
    Daily,
    /// A new file each hour.
    Hourly,
    /// A single file.
    Never,
}

impl FileRotation {
    fn rotation(self) -> Rotation {
        match self {
            Self::Daily => Rotation::DAILY,
            Self::Hourly => Rotation::HOURLY,
            Self::Never => Rotation::NEVER,
        }
    }
}

/// Event formatting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, for reading at a terminal.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// One JSON object per event, for log shippers.
    Json,
    /// The `tracing-subscriber` default layout.
    Full,
}

impl std::str::FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "full" => Ok(Self::Full),
            other => Err(TelemetryError::ConfigError(format!(
                "unknown log format '{other}'"
            ))),
        }
    }
}

/// Where events are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Not usable while serving the stdio protocol.
    Stdout,
    /// Standard error.
    #[default]
    Stderr,
    /// Rolling files named `<prefix>.<date>` under `directory`.
    File {
        /// Created on setup if missing.
        directory: PathBuf,
        /// File name prefix.
        prefix: String,
        /// Rotation period.
        rotation: FileRotation,
    },
}

impl LogTarget {
    fn writer(&self) -> TelemetryResult<BoxMakeWriter> {
        Ok(match self {
            Self::Stdout => BoxMakeWriter::new(std::io::stdout),
            Self::Stderr => BoxMakeWriter::new(std::io::stderr),
            Self::File {
                directory,
                prefix,
                rotation,
            } => {
                std::fs::create_dir_all(directory)?;
                BoxMakeWriter::new(RollingFileAppender::new(
                    rotation.rotation(),
                    directory,
                    prefix,
                ))
            },
        })
    }

    fn is_terminal_stream(&self) -> bool {
        !matches!(self, Self::File { .. })
    }
}

/// Logging configuration for the gateway and its CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Base level filter, e.g. `info`.
    pub level: String,
    /// Event formatting.
    #[serde(default)]
    pub format: LogFormat,
    /// Event destination.
    #[serde(default)]
    pub target: LogTarget,
    /// Extra filter directives, e.g. `warden_sandbox=debug`.
    #[serde(default)]
    pub directives: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl LogConfig {
    /// Compact events to stderr at `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::Compact,
            target: LogTarget::Stderr,
            directives: Vec::new(),
        }
    }

    /// Set the format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the target.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Add a filter directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Redirect a stdout target to stderr so events never interleave with
    /// protocol responses. File targets are kept.
    #[must_use]
    pub fn protocol_safe(mut self) -> Self {
        if self.target == LogTarget::Stdout {
            self.target = LogTarget::Stderr;
        }
        self
    }

    /// Build from the `[logging]` configuration section.
    ///
    /// A `file` target without a directory falls back to stderr.
    ///
    /// # Errors
    ///
    /// Returns an error if the format or target is unknown.
    #[cfg(feature = "config")]
    pub fn from_section(section: &warden_config::LoggingSection) -> TelemetryResult<Self> {
        let target = match (section.target.as_str(), &section.directory) {
            ("stdout", _) => LogTarget::Stdout,
            ("stderr", _) | ("file", None) => LogTarget::Stderr,
            ("file", Some(directory)) => LogTarget::File {
                directory: directory.clone(),
                prefix: "warden".to_owned(),
                rotation: FileRotation::Daily,
            },
            (other, _) => {
                return Err(TelemetryError::ConfigError(format!(
                    "unknown log target '{other}'"
                )));
            },
        };
        Ok(Self {
            level: section.level.to_lowercase(),
            format: section.format.parse()?,
            target,
            directives: section.directives.clone(),
        })
    }

    fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::ConfigError(format!("level '{}': {e}", self.level)))?;
        for directive in &self.directives {
            let parsed = directive.parse().map_err(
                |e: tracing_subscriber::filter::ParseError| {
                    TelemetryError::ConfigError(format!("directive '{directive}': {e}"))
                },
            )?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns an error for an invalid filter, an unusable log directory, or
/// when a global subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.filter()?;
    let layer = fmt::layer()
        .with_writer(config.target.writer()?)
        .with_ansi(config.target.is_terminal_stream() && config.format != LogFormat::Json)
        .with_target(true);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry.with(layer.json()).try_init(),
        LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
        LogFormat::Compact => registry.with(layer.compact()).try_init(),
        LogFormat::Full => registry.with(layer).try_init(),
    };
    installed.map_err(|e| TelemetryError::InitError(e.to_string()))
}
