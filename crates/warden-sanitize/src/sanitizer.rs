//! The output sanitizer.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{SanitizeError, SanitizeResult};
use crate::json::{KeyPolicy, redact_value};
use crate::rule::RedactionRule;

/// Default replacement text.
pub const DEFAULT_PLACEHOLDER: &str = "[REDACTED]";

/// Default sensitive key fragments for structured output.
pub const DEFAULT_SENSITIVE_KEYS: &[&str] = &["token", "password", "secret", "key", "cert", "tls"];

/// Default Kubernetes kinds whose `data`, `stringData` and `binaryData`
/// entries are always redacted.
pub const DEFAULT_DATA_KINDS: &[&str] = &["Secret", "ConfigMap"];

/// Default bound on redaction passes.
pub const DEFAULT_MAX_PASSES: usize = 4;

/// Sanitized output and how many redactions produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// Output safe to return and log.
    pub output: String,
    /// Number of replacements made.
    pub redactions: usize,
}

/// Redacts secrets from tool output.
///
/// Each pass runs key-based redaction (when the output is JSON) followed by
/// every rule in order. Passes repeat until one changes nothing; output
/// that has not settled after `max_passes` is replaced wholesale by the
/// placeholder. The result is a fixpoint, so sanitizing it again changes
/// nothing.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    placeholder: String,
    sensitive_keys: Vec<String>,
    data_kinds: Vec<String>,
    rules: Vec<RedactionRule>,
    max_passes: usize,
}

impl Sanitizer {
    /// Build a sanitizer.
    ///
    /// # Errors
    ///
    /// Returns [`SanitizeError::MatchesPlaceholder`] if any rule matches the
    /// placeholder, and rejects an empty placeholder or zero passes.
    pub fn new<K>(
        placeholder: impl Into<String>,
        sensitive_keys: K,
        rules: Vec<RedactionRule>,
        max_passes: usize,
    ) -> SanitizeResult<Self>
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        let placeholder = placeholder.into();
        if placeholder.is_empty() {
            return Err(SanitizeError::EmptyPlaceholder);
        }
        if max_passes == 0 {
            return Err(SanitizeError::NoPasses);
        }
        if let Some(rule) = rules.iter().find(|r| r.matches(&placeholder)) {
            return Err(SanitizeError::MatchesPlaceholder {
                rule: rule.name().to_owned(),
                placeholder,
            });
        }
        Ok(Self {
            placeholder,
            sensitive_keys: sensitive_keys
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
            data_kinds: DEFAULT_DATA_KINDS.iter().map(|k| (*k).to_owned()).collect(),
            rules,
            max_passes,
        })
    }

    /// A sanitizer with default keys and placeholder and the given rules.
    ///
    /// # Errors
    ///
    /// See [`Sanitizer::new`].
    pub fn with_rules(rules: Vec<RedactionRule>) -> SanitizeResult<Self> {
        Self::new(
            DEFAULT_PLACEHOLDER,
            DEFAULT_SENSITIVE_KEYS,
            rules,
            DEFAULT_MAX_PASSES,
        )
    }

    /// Replace the object kinds whose payload maps are redacted.
    #[must_use]
    pub fn with_data_kinds<K>(mut self, kinds: K) -> Self
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        self.data_kinds = kinds.into_iter().map(|k| k.as_ref().to_owned()).collect();
        self
    }

    /// Replacement text.
    #[must_use]
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Rules in application order.
    #[must_use]
    pub fn rules(&self) -> &[RedactionRule] {
        &self.rules
    }

    /// Sanitize `raw`. Never fails.
    #[must_use]
    pub fn sanitize(&self, raw: &str) -> Sanitized {
        let mut text = raw.to_owned();
        let mut redactions = 0usize;

        for pass in 1..=self.max_passes {
            let changed = self.pass(&mut text);
            if changed == 0 {
                if redactions > 0 {
                    debug!(redactions, passes = pass, "output redacted");
                }
                return Sanitized {
                    output: text,
                    redactions,
                };
            }
            redactions = redactions.saturating_add(changed);
        }

        warn!(
            max_passes = self.max_passes,
            "redaction did not settle, suppressing entire output"
        );
        Sanitized {
            output: self.placeholder.clone(),
            redactions: redactions.saturating_add(1),
        }
    }

    /// One pass over `text`. Returns the number of replacements.
    fn pass(&self, text: &mut String) -> usize {
        let mut count = 0usize;

        let structured = !self.sensitive_keys.is_empty() || !self.data_kinds.is_empty();
        if structured && let Ok(mut doc) = serde_json::from_str::<Value>(text) {
            let policy = KeyPolicy {
                fragments: &self.sensitive_keys,
                data_kinds: &self.data_kinds,
                placeholder: &self.placeholder,
            };
            let replaced = redact_value(&mut doc, &policy);
            if replaced > 0
                && let Ok(serialized) = serde_json::to_string_pretty(&doc)
            {
                *text = serialized;
                count = count.saturating_add(replaced);
            }
        }

        for rule in &self.rules {
            if let Some((next, replaced)) = rule.apply(text, &self.placeholder) {
                debug!(rule = rule.name(), replaced, "redaction rule matched");
                *text = next;
                count = count.saturating_add(replaced);
            }
        }

        count
    }
}
