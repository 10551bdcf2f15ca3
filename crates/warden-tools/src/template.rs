//! Argument templates mapping validated arguments onto an argv vector.
//!
//! A template is one argv element. It may contain `{field}` placeholders,
//! which must resolve, or `{field?}` placeholders, which drop the whole
//! element when the field is absent. Values are always substituted into a
//! single element; nothing is ever handed to a shell.

use serde_json::Value;
use warden_core::Arguments;

use crate::schema::InputSchema;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field { name: String, optional: bool },
}

/// One parsed argv template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl ArgTemplate {
    /// Parse a template string.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if a placeholder is empty or
    /// unterminated, or a `}` has no opening brace.
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find('{') {
            let (literal, tail) = rest.split_at(open);
            if literal.contains('}') {
                return Err(format!("unbalanced '}}' in '{source}'"));
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(literal.to_owned()));
            }
            let tail = &tail[1..];
            let close = tail
                .find('}')
                .ok_or_else(|| format!("unterminated placeholder in '{source}'"))?;
            let raw = &tail[..close];
            let (name, optional) = match raw.strip_suffix('?') {
                Some(name) => (name, true),
                None => (raw, false),
            };
            if name.is_empty() {
                return Err(format!("empty placeholder in '{source}'"));
            }
            segments.push(Segment::Field {
                name: name.to_owned(),
                optional,
            });
            rest = &tail[close.saturating_add(1)..];
        }
        if rest.contains('}') {
            return Err(format!("unbalanced '}}' in '{source}'"));
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_owned()));
        }
        Ok(Self {
            source: source.to_owned(),
            segments,
        })
    }

    /// The template text as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Field names this template references.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render against arguments.
    ///
    /// Returns `Ok(None)` when an optional field is absent.
    ///
    /// # Errors
    ///
    /// Returns the field name when a required placeholder has no value.
    pub fn render(&self, args: &Arguments) -> Result<Option<String>, String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { name, optional } => match args.get(name).and_then(scalar) {
                    Some(value) => out.push_str(&value),
                    None if *optional => return Ok(None),
                    None => return Err(name.clone()),
                },
            }
        }
        Ok(Some(out))
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// How a tool maps onto a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable name or path.
    pub program: String,
    /// Argument templates, one per argv element.
    pub args: Vec<ArgTemplate>,
    /// String field written to standard input.
    pub stdin_field: Option<String>,
}

/// A fully rendered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Executable name or path.
    pub program: String,
    /// Argument vector, excluding the program.
    pub argv: Vec<String>,
    /// Bytes for standard input.
    pub stdin: Option<String>,
}

impl Invocation {
    /// Parse templates into an invocation.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed template.
    pub fn new(
        program: impl Into<String>,
        args: &[impl AsRef<str>],
        stdin_field: Option<String>,
    ) -> Result<Self, String> {
        let args = args
            .iter()
            .map(|a| ArgTemplate::parse(a.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            program: program.into(),
            args,
            stdin_field,
        })
    }

    /// Check that every placeholder names a declared field.
    ///
    /// # Errors
    ///
    /// Returns a description of the first undeclared reference.
    pub fn check_fields(&self, schema: &InputSchema) -> Result<(), String> {
        for template in &self.args {
            if let Some(name) = template.fields().find(|n| schema.field(n).is_none()) {
                return Err(format!(
                    "template '{}' names undeclared field '{name}'",
                    template.source()
                ));
            }
        }
        if let Some(stdin) = &self.stdin_field
            && schema.field(stdin).is_none()
        {
            return Err(format!("stdin field '{stdin}' is not declared"));
        }
        Ok(())
    }

    /// Render against validated arguments.
    ///
    /// # Errors
    ///
    /// Returns the name of a required field that has no value.
    pub fn render(&self, args: &Arguments) -> Result<CommandLine, String> {
        let mut argv = Vec::with_capacity(self.args.len());
        for template in &self.args {
            if let Some(element) = template.render(args)? {
                argv.push(element);
            }
        }
        let stdin = self
            .stdin_field
            .as_ref()
            .and_then(|field| args.get(field))
            .and_then(Value::as_str)
            .map(str::to_owned);
        Ok(CommandLine {
            program: self.program.clone(),
            argv,
            stdin,
        })
    }
}
