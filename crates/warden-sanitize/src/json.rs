//! Key-based redaction of structured output.

use serde_json::{Map, Value};

/// Payload maps of Kubernetes objects.
const DATA_KEYS: &[&str] = &["data", "stringData", "binaryData"];

/// What the structured stage treats as sensitive.
pub(crate) struct KeyPolicy<'a> {
    /// Lowercase key fragments.
    pub(crate) fragments: &'a [String],
    /// Object kinds whose payload maps are redacted entry by entry.
    pub(crate) data_kinds: &'a [String],
    pub(crate) placeholder: &'a str,
}

/// Replace sensitive values in `value`. Returns the number replaced.
///
/// A value is sensitive when its key, lowercased, contains one of the
/// fragments, or when it sits in a payload map (`data`, `stringData`,
/// `binaryData`) of an object whose `kind` is one of the data kinds.
pub(crate) fn redact_value(value: &mut Value, policy: &KeyPolicy<'_>) -> usize {
    match value {
        Value::Object(map) => redact_object(map, policy),
        Value::Array(items) => items
            .iter_mut()
            .fold(0usize, |n, item| n.saturating_add(redact_value(item, policy))),
        _ => 0,
    }
}

fn redact_object(map: &mut Map<String, Value>, policy: &KeyPolicy<'_>) -> usize {
    let carries_payload = map
        .get("kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| policy.data_kinds.iter().any(|k| k == kind));
    let mut count = 0usize;
    for (key, value) in map.iter_mut() {
        let replaced = if is_sensitive(key, policy.fragments) {
            replace(value, policy.placeholder)
        } else if carries_payload && DATA_KEYS.contains(&key.as_str()) {
            replace_entries(value, policy.placeholder)
        } else {
            redact_value(value, policy)
        };
        count = count.saturating_add(replaced);
    }
    count
}

fn is_sensitive(key: &str, fragments: &[String]) -> bool {
    let key = key.to_lowercase();
    fragments.iter().any(|f| key.contains(f.as_str()))
}

fn replace(value: &mut Value, placeholder: &str) -> usize {
    if value.as_str() == Some(placeholder) {
        return 0;
    }
    *value = Value::String(placeholder.to_owned());
    1
}

fn replace_entries(value: &mut Value, placeholder: &str) -> usize {
    match value {
        Value::Object(entries) => entries.values_mut().fold(0usize, |n, v| {
            n.saturating_add(replace(v, placeholder))
        }),
        other => replace(other, placeholder),
    }
}
