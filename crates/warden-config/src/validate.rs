//! Post-merge configuration validation.
//!
//! Validates that deserialized [`Config`](crate::Config) values are within
//! acceptable ranges and that cross-section references resolve.

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, FieldKind, FieldSection, OverflowMode, ToolSection};

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_server(config)?;
    validate_logging(config)?;
    validate_sandbox(config)?;
    validate_sanitizer(config)?;
    validate_tools(config)?;
    validate_roles(config)?;
    validate_principals(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> ConfigResult<()> {
    if config.server.max_request_bytes == 0 {
        return Err(ConfigError::invalid(
            "server.max_request_bytes",
            "must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;

    if !matches!(
        l.level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(ConfigError::invalid(
            "logging.level",
            format!(
                "unknown log level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }

    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(ConfigError::invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }

    match l.target.as_str() {
        "stderr" | "stdout" => Ok(()),
        "file" if l.directory.is_some() => Ok(()),
        "file" => Err(ConfigError::invalid(
            "logging.directory",
            "required when logging.target = \"file\"",
        )),
        other => Err(ConfigError::invalid(
            "logging.target",
            format!("unknown target '{other}'; expected one of: stderr, stdout, file"),
        )),
    }
}

fn validate_sandbox(config: &Config) -> ConfigResult<()> {
    let s = &config.sandbox;

    if s.max_concurrent == 0 {
        return Err(ConfigError::invalid(
            "sandbox.max_concurrent",
            "must be at least 1",
        ));
    }
    if s.overflow == OverflowMode::Queue && s.max_queue == 0 {
        return Err(ConfigError::invalid(
            "sandbox.max_queue",
            "must be at least 1 when overflow = \"queue\"",
        ));
    }
    if s.max_timeout_secs == 0 {
        return Err(ConfigError::invalid(
            "sandbox.max_timeout_secs",
            "must be at least 1",
        ));
    }
    if s.max_output_bytes == 0 {
        return Err(ConfigError::invalid(
            "sandbox.max_output_bytes",
            "must be greater than zero",
        ));
    }
    if s.journal_capacity == 0 {
        return Err(ConfigError::invalid(
            "sandbox.journal_capacity",
            "must be at least 1",
        ));
    }
    Ok(())
}

fn validate_sanitizer(config: &Config) -> ConfigResult<()> {
    let s = &config.sanitizer;

    if s.placeholder.is_empty() {
        return Err(ConfigError::invalid(
            "sanitizer.placeholder",
            "must not be empty",
        ));
    }
    if s.max_passes == 0 {
        return Err(ConfigError::invalid(
            "sanitizer.max_passes",
            "must be at least 1",
        ));
    }
    if let Some(key) = s
        .sensitive_keys
        .iter()
        .find(|k| k.is_empty() || k.to_lowercase() != **k)
    {
        return Err(ConfigError::invalid(
            "sanitizer.sensitive_keys",
            format!("'{key}' must be a non-empty lowercase fragment"),
        ));
    }

    for rule in &s.rules {
        let field = format!("sanitizer.rules.{}", rule.name);
        let re = regex::Regex::new(&rule.pattern)
            .map_err(|e| ConfigError::invalid(&field, format!("invalid pattern: {e}")))?;
        if re.is_match(&s.placeholder) {
            return Err(ConfigError::invalid(
                &field,
                format!("pattern matches the placeholder '{}'", s.placeholder),
            ));
        }
    }
    Ok(())
}

fn validate_tools(config: &Config) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for tool in &config.tools {
        if !seen.insert(tool.name.as_str()) {
            return Err(ConfigError::invalid(
                "tools",
                format!("duplicate tool name '{}'", tool.name),
            ));
        }
        validate_tool(tool, config.sandbox.max_timeout_secs)?;
    }
    Ok(())
}

fn validate_tool(tool: &ToolSection, max_timeout_secs: u64) -> ConfigResult<()> {
    let prefix = format!("tools.{}", tool.name);

    if tool.name.is_empty()
        || !tool
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::invalid(
            "tools.name",
            format!(
                "'{}' must be non-empty and contain only letters, digits, '_' and '-'",
                tool.name
            ),
        ));
    }

    if tool.timeout_secs == 0 || tool.timeout_secs > max_timeout_secs {
        return Err(ConfigError::invalid(
            format!("{prefix}.timeout_secs"),
            format!(
                "{} must be between 1 and sandbox.max_timeout_secs ({max_timeout_secs})",
                tool.timeout_secs
            ),
        ));
    }

    if tool.max_output_bytes == Some(0) {
        return Err(ConfigError::invalid(
            format!("{prefix}.max_output_bytes"),
            "must be greater than zero",
        ));
    }

    if tool.invocation.program.is_empty() {
        return Err(ConfigError::invalid(
            format!("{prefix}.invocation.program"),
            "must not be empty",
        ));
    }

    let mut field_names = HashSet::new();
    for field in &tool.input {
        if !field_names.insert(field.name.as_str()) {
            return Err(ConfigError::invalid(
                format!("{prefix}.input"),
                format!("duplicate field '{}'", field.name),
            ));
        }
        validate_field(field, &prefix)?;
    }

    for template in &tool.invocation.args {
        for name in template_fields(template).map_err(|message| {
            ConfigError::invalid(format!("{prefix}.invocation.args"), message)
        })? {
            if tool.field(name).is_none() {
                return Err(ConfigError::invalid(
                    format!("{prefix}.invocation.args"),
                    format!("template '{template}' names undeclared field '{name}'"),
                ));
            }
        }
    }

    for (label, name) in [
        ("scope_field", tool.scope_field.as_deref()),
        ("invocation.stdin_field", tool.invocation.stdin_field.as_deref()),
    ] {
        let Some(name) = name else { continue };
        match tool.field(name) {
            Some(field) if field.kind == FieldKind::String => {},
            Some(_) => {
                return Err(ConfigError::invalid(
                    format!("{prefix}.{label}"),
                    format!("field '{name}' must be declared as a string"),
                ));
            },
            None => {
                return Err(ConfigError::invalid(
                    format!("{prefix}.{label}"),
                    format!("field '{name}' is not declared"),
                ));
            },
        }
    }

    Ok(())
}

fn validate_field(field: &FieldSection, prefix: &str) -> ConfigResult<()> {
    let path = format!("{prefix}.input.{}", field.name);

    if field.kind != FieldKind::String && (field.allowed.is_some() || field.max_length.is_some()) {
        return Err(ConfigError::invalid(
            &path,
            "enum and max_length apply only to string fields",
        ));
    }
    if field.kind != FieldKind::Integer && (field.minimum.is_some() || field.maximum.is_some()) {
        return Err(ConfigError::invalid(
            &path,
            "minimum and maximum apply only to integer fields",
        ));
    }
    if let (Some(min), Some(max)) = (field.minimum, field.maximum)
        && min > max
    {
        return Err(ConfigError::invalid(
            &path,
            format!("minimum ({min}) exceeds maximum ({max})"),
        ));
    }

    if let Some(default) = &field.default {
        let type_ok = match field.kind {
            FieldKind::String => default.is_string(),
            FieldKind::Integer => default.is_i64(),
            FieldKind::Boolean => default.is_boolean(),
        };
        if !type_ok {
            return Err(ConfigError::invalid(
                &path,
                format!("default {default} does not match the declared type"),
            ));
        }
        if let (Some(allowed), Some(s)) = (&field.allowed, default.as_str())
            && !allowed.iter().any(|a| a == s)
        {
            return Err(ConfigError::invalid(
                &path,
                format!("default '{s}' is not one of the allowed values"),
            ));
        }
    }
    Ok(())
}

/// Field names referenced by an argument template.
///
/// `{name}` and `{name?}` are placeholders; `{{` and `}}` are not supported.
fn template_fields(template: &str) -> Result<Vec<&str>, String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open.saturating_add(1)..];
        let close = after
            .find('}')
            .ok_or_else(|| format!("unterminated placeholder in '{template}'"))?;
        let name = after[..close].trim_end_matches('?');
        if name.is_empty() {
            return Err(format!("empty placeholder in '{template}'"));
        }
        names.push(name);
        rest = &after[close.saturating_add(1)..];
    }
    if rest.contains('}') {
        return Err(format!("unbalanced '}}' in '{template}'"));
    }
    Ok(names)
}

fn validate_roles(config: &Config) -> ConfigResult<()> {
    for (role_name, role) in &config.roles {
        for tool in &role.tools {
            if !config.tools.iter().any(|t| &t.name == tool) {
                return Err(ConfigError::invalid(
                    format!("roles.{role_name}.tools"),
                    format!("unknown tool '{tool}'"),
                ));
            }
        }
        for pattern in &role.namespaces {
            globset::Glob::new(pattern).map_err(|e| {
                ConfigError::invalid(
                    format!("roles.{role_name}.namespaces"),
                    format!("invalid glob '{pattern}': {e}"),
                )
            })?;
        }
    }
    Ok(())
}

fn validate_principals(config: &Config) -> ConfigResult<()> {
    for (principal, role) in &config.principals {
        if !config.roles.contains_key(role) {
            return Err(ConfigError::invalid(
                format!("principals.{principal}"),
                format!("unknown role '{role}'"),
            ));
        }
    }
    Ok(())
}
