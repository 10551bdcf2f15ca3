//! Schema and injection-safety checks on call arguments.

use serde_json::Value;
use warden_core::Arguments;

use crate::error::{ValidationError, ValidationResult};
use crate::schema::{FieldSpec, FieldType};
use crate::tool::{TIMEOUT_OVERRIDE_FIELD, Tool};

/// Shell and redirection metacharacters never allowed in screened strings.
const FORBIDDEN: &[char] = &[';', '|', '&', '$', '`', '>', '<'];

/// Validate `args` against `tool`, returning normalized arguments.
///
/// Checks, in order: unknown fields; defaults applied then required
/// fields; types; enum membership; length and numeric bounds; the
/// `timeout_seconds` override against the tool budget; metacharacter and
/// option-injection screening unless the tool allows raw passthrough.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate(tool: &Tool, args: &Arguments) -> ValidationResult<Arguments> {
    let schema = &tool.input_schema;

    if let Some(unknown) = args.keys().find(|k| schema.field(k).is_none()) {
        return Err(ValidationError::UnknownField(unknown.clone()));
    }

    let mut normalized = Arguments::new();
    for field in schema.fields() {
        let value = match args.get(&field.name) {
            Some(Value::Null) | None => field.default.clone(),
            Some(v) => Some(v.clone()),
        };
        let Some(value) = value else {
            if field.required {
                return Err(ValidationError::MissingField(field.name.clone()));
            }
            continue;
        };
        check_value(field, &value)?;
        if field.name == TIMEOUT_OVERRIDE_FIELD
            && let Some(requested) = value.as_i64()
        {
            check_timeout(requested, tool.timeout.as_secs())?;
        }
        if let Some(s) = value.as_str()
            && !tool.raw_passthrough
        {
            screen(&field.name, s)?;
        }
        normalized.insert(field.name.clone(), value);
    }

    Ok(normalized)
}

/// Requested budget override, in seconds, from normalized arguments.
#[must_use]
pub fn timeout_override(args: &Arguments) -> Option<u64> {
    args.get(TIMEOUT_OVERRIDE_FIELD)
        .and_then(Value::as_i64)
        .and_then(|s| u64::try_from(s).ok())
}

fn check_value(field: &FieldSpec, value: &Value) -> ValidationResult<()> {
    let mismatch = || ValidationError::TypeMismatch {
        field: field.name.clone(),
        expected: field.field_type.as_str(),
    };

    match field.field_type {
        FieldType::Boolean => {
            value.as_bool().ok_or_else(mismatch)?;
        },
        FieldType::Integer => {
            let n = value.as_i64().ok_or_else(mismatch)?;
            let min = field.minimum.unwrap_or(i64::MIN);
            let max = field.maximum.unwrap_or(i64::MAX);
            if n < min || n > max {
                return Err(ValidationError::OutOfRange {
                    field: field.name.clone(),
                    min,
                    max,
                });
            }
        },
        FieldType::String => {
            let s = value.as_str().ok_or_else(mismatch)?;
            if let Some(allowed) = &field.allowed
                && !allowed.iter().any(|a| a == s)
            {
                return Err(ValidationError::NotAllowed {
                    field: field.name.clone(),
                    allowed: allowed.join(", "),
                });
            }
            if let Some(max) = field.max_length
                && s.chars().count() > max
            {
                return Err(ValidationError::TooLong {
                    field: field.name.clone(),
                    max,
                });
            }
        },
    }
    Ok(())
}

fn check_timeout(requested: i64, limit: u64) -> ValidationResult<()> {
    let within = u64::try_from(requested).is_ok_and(|r| r >= 1 && r <= limit);
    if within {
        Ok(())
    } else {
        Err(ValidationError::TimeoutTooLong { requested, limit })
    }
}

fn screen(field: &str, value: &str) -> ValidationResult<()> {
    if let Some(found) = value
        .chars()
        .find(|c| FORBIDDEN.contains(c) || c.is_control())
    {
        return Err(ValidationError::ForbiddenCharacter {
            field: field.to_owned(),
            found,
        });
    }
    if value.starts_with('-') {
        return Err(ValidationError::OptionInjection(field.to_owned()));
    }
    Ok(())
}
