//! Pattern-based redaction rules.

use regex::Regex;

use crate::error::{SanitizeError, SanitizeResult};

/// Name of the capture group that limits a replacement to part of a match.
pub const SECRET_GROUP: &str = "secret";

/// One ordered redaction rule.
///
/// When the pattern has a `secret` group only that group is replaced, so
/// `Authorization: Bearer abc` becomes `Authorization: Bearer [REDACTED]`.
#[derive(Debug, Clone)]
pub struct RedactionRule {
    name: String,
    regex: Regex,
    partial: bool,
}

impl RedactionRule {
    /// Compile a rule.
    ///
    /// # Errors
    ///
    /// Returns [`SanitizeError::InvalidPattern`] if the regex is malformed.
    pub fn new(name: impl Into<String>, pattern: &str) -> SanitizeResult<Self> {
        let name = name.into();
        let regex = Regex::new(pattern).map_err(|source| SanitizeError::InvalidPattern {
            rule: name.clone(),
            source,
        })?;
        let partial = regex.capture_names().flatten().any(|n| n == SECRET_GROUP);
        Ok(Self {
            name,
            regex,
            partial,
        })
    }

    /// Rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pattern source.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub(crate) fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Replace every match (or `secret` group) not already equal to
    /// `placeholder`. Returns the new text and the replacement count, or
    /// `None` when nothing changed.
    pub(crate) fn apply(&self, text: &str, placeholder: &str) -> Option<(String, usize)> {
        let mut out = String::new();
        let mut last = 0;
        let mut count = 0usize;
        for caps in self.regex.captures_iter(text) {
            let target = if self.partial {
                caps.name(SECRET_GROUP)
            } else {
                caps.get(0)
            };
            let Some(m) = target else { continue };
            if m.as_str().is_empty() || m.as_str() == placeholder {
                continue;
            }
            out.push_str(&text[last..m.start()]);
            out.push_str(placeholder);
            last = m.end();
            count = count.saturating_add(1);
        }
        if count == 0 {
            return None;
        }
        out.push_str(&text[last..]);
        Some((out, count))
    }
}
