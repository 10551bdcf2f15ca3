//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `/etc/warden/config.toml` (system), if present
//! 3. Merge the explicit `--config` file, which must exist
//! 4. Apply `WARDEN_*` env var fallbacks for fields no file set
//! 5. Deserialize merged tree → `Config`
//! 6. Validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Default system-wide config location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/warden/config.toml";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A configuration together with where its values came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Dotted field path → which layer set the value.
    pub field_sources: FieldSources,
    /// Config file paths that were loaded, in precedence order.
    pub loaded_files: Vec<String>,
}

/// Inputs to [`load_with`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// System config path. Skipped silently when the file does not exist.
    pub system_path: Option<PathBuf>,
    /// Explicit config path. Must exist when given.
    pub explicit_path: Option<PathBuf>,
    /// Environment used for fallbacks.
    pub env_vars: HashMap<String, String>,
}

impl LoadOptions {
    /// Options for a normal process start: real system path, real env.
    #[must_use]
    pub fn from_environment(explicit_path: Option<&Path>) -> Self {
        Self {
            system_path: Some(PathBuf::from(SYSTEM_CONFIG_PATH)),
            explicit_path: explicit_path.map(Path::to_path_buf),
            env_vars: collect_env_vars(),
        }
    }
}

/// Load configuration with the full precedence chain.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is unreadable or malformed,
/// or if the final merged configuration fails validation.
pub fn load(explicit_path: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    load_with(&LoadOptions::from_environment(explicit_path))
}

/// Load configuration from explicit inputs.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is unreadable or malformed,
/// or if the final merged configuration fails validation.
pub fn load_with(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
    let mut merged = parse_defaults()?;
    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    if let Some(system_path) = &options.system_path
        && let Some(overlay) = try_load_file(system_path)?
    {
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::System,
            &mut field_sources,
        );
        loaded_files.push(system_path.display().to_string());
        info!(path = %system_path.display(), "loaded system config");
    }

    if let Some(explicit_path) = &options.explicit_path {
        let overlay = try_load_file(explicit_path)?.ok_or_else(|| ConfigError::Missing {
            path: explicit_path.clone(),
        })?;
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::Explicit,
            &mut field_sources,
        );
        loaded_files.push(explicit_path.display().to_string());
        info!(path = %explicit_path.display(), "loaded config file");
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, &options.env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config = finish(merged, "<merged config>")?;
    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load the embedded defaults with a TOML overlay. No files, no env.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the overlay is malformed or the result
/// fails validation.
pub fn load_str(overlay: &str) -> ConfigResult<Config> {
    let mut merged = parse_defaults()?;
    let overlay: toml::Value = toml::from_str(overlay).map_err(|e| ConfigError::Parse {
        origin: "<inline>".to_owned(),
        source: e,
    })?;
    let mut sources = FieldSources::new();
    deep_merge_tracking(
        &mut merged,
        &overlay,
        "",
        &ConfigLayer::Explicit,
        &mut sources,
    );
    finish(merged, "<inline>")
}

fn parse_defaults() -> ConfigResult<toml::Value> {
    toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::Parse {
        origin: "<embedded defaults>".to_owned(),
        source: e,
    })
}

fn finish(merged: toml::Value, label: &str) -> ConfigResult<Config> {
    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                origin: label.to_owned(),
                source: e,
            })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::invalid(
            path.display().to_string(),
            format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        ));
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        origin: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}
