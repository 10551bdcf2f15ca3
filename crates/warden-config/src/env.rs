//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only apply to fields that
//! no config file set. Values from the embedded defaults may be replaced.

use std::collections::HashMap;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

#[derive(Clone, Copy)]
enum Kind {
    Text,
    Integer,
}

/// `(variable, dotted field, value kind)`.
const FALLBACKS: &[(&str, &str, Kind)] = &[
    ("WARDEN_LOG_LEVEL", "logging.level", Kind::Text),
    ("WARDEN_LOG_FORMAT", "logging.format", Kind::Text),
    ("WARDEN_AUDIT_PATH", "audit.path", Kind::Text),
    ("WARDEN_MAX_CONCURRENT", "sandbox.max_concurrent", Kind::Integer),
];

/// Apply environment fallbacks to fields still holding their default.
///
/// Returns how many variables were applied. An integer variable that does
/// not parse is passed through as a string so deserialization reports it.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut applied: usize = 0;
    for &(var, field, kind) in FALLBACKS {
        let set_by_file = sources
            .get(field)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults);
        if set_by_file {
            continue;
        }
        let Some(raw) = env_vars.get(var) else {
            continue;
        };
        let Some((section, key)) = field.split_once('.') else {
            continue;
        };
        let Some(root) = merged.as_table_mut() else {
            continue;
        };
        let value = match kind {
            Kind::Integer => raw
                .trim()
                .parse::<i64>()
                .map_or_else(|_| toml::Value::String(raw.clone()), toml::Value::Integer),
            Kind::Text => toml::Value::String(raw.clone()),
        };
        let table = root
            .entry(section)
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        if let Some(table) = table.as_table_mut() {
            debug!(var, field, "applying environment fallback");
            table.insert(key.to_owned(), value);
            sources.insert(field.to_owned(), ConfigLayer::Environment);
            applied = applied.saturating_add(1);
        }
    }
    applied
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}
