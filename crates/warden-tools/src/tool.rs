//! Tool definitions.

use std::time::Duration;

use serde_json::{Value, json};

use crate::error::{RegistryError, RegistryResult};
use crate::schema::{FieldType, InputSchema};
use crate::template::Invocation;

/// Argument that lowers a call's budget below the tool's own timeout.
pub const TIMEOUT_OVERRIDE_FIELD: &str = "timeout_seconds";

/// An invocable operation. Immutable once registered.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
    /// Unique name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Input fields.
    pub input_schema: InputSchema,
    /// Wall-clock execution budget.
    pub timeout: Duration,
    /// Per-tool output ceiling, in bytes.
    pub max_output_bytes: Option<usize>,
    /// Whether string arguments skip metacharacter screening.
    pub raw_passthrough: bool,
    /// Argument holding the namespace the call acts within.
    pub scope_field: Option<String>,
    /// Process mapping.
    pub invocation: Invocation,
}

impl Tool {
    /// Assemble and check a tool definition.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidTool`] if the invocation references
    /// undeclared fields or the scope field is not a declared string.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
        timeout: Duration,
        invocation: Invocation,
    ) -> RegistryResult<Self> {
        let tool = Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            timeout,
            max_output_bytes: None,
            raw_passthrough: false,
            scope_field: None,
            invocation,
        };
        tool.check()?;
        Ok(tool)
    }

    /// Set the scope field.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidTool`] if the field is not a declared
    /// string.
    pub fn with_scope_field(mut self, field: impl Into<String>) -> RegistryResult<Self> {
        self.scope_field = Some(field.into());
        self.check()?;
        Ok(self)
    }

    /// Allow raw string arguments.
    #[must_use]
    pub fn with_raw_passthrough(mut self, allowed: bool) -> Self {
        self.raw_passthrough = allowed;
        self
    }

    /// Set the per-tool output ceiling.
    #[must_use]
    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = Some(max);
        self
    }

    fn check(&self) -> RegistryResult<()> {
        let invalid = |reason: String| RegistryError::InvalidTool {
            name: self.name.clone(),
            reason,
        };
        if self.name.is_empty() {
            return Err(invalid("name must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be positive".into()));
        }
        self.invocation
            .check_fields(&self.input_schema)
            .map_err(invalid)?;
        if let Some(scope) = &self.scope_field {
            match self.input_schema.field(scope) {
                Some(f) if f.field_type == FieldType::String => {},
                _ => return Err(invalid(format!("scope field '{scope}' must be a declared string"))),
            }
        }
        Ok(())
    }

    /// Descriptor returned by `list_tools`.
    #[must_use]
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema.to_json_schema(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;

    fn invocation(args: &[&str]) -> Invocation {
        Invocation::new("echo", args, None).unwrap()
    }

    #[test]
    fn test_valid_tool() {
        let tool = Tool::new(
            "echo",
            "Echo a message",
            InputSchema::new(vec![FieldSpec::string("message").required()]),
            Duration::from_secs(5),
            invocation(&["{message}"]),
        )
        .unwrap();
        let descriptor = tool.descriptor();
        assert_eq!(descriptor["name"], "echo");
        assert_eq!(descriptor["inputSchema"]["required"], json!(["message"]));
    }

    #[test]
    fn test_undeclared_template_field_rejected() {
        let err = Tool::new(
            "echo",
            "",
            InputSchema::default(),
            Duration::from_secs(5),
            invocation(&["{message}"]),
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTool { .. }));
    }

    #[test]
    fn test_scope_field_must_be_string() {
        let tool = Tool::new(
            "count",
            "",
            InputSchema::new(vec![FieldSpec::integer("n")]),
            Duration::from_secs(5),
            invocation(&[]),
        )
        .unwrap();
        assert!(tool.with_scope_field("n").is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(
            Tool::new(
                "t",
                "",
                InputSchema::default(),
                Duration::ZERO,
                invocation(&[])
            )
            .is_err()
        );
    }
}
