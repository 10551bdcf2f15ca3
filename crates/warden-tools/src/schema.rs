//! Tool input schemas.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Declared type of an input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 string.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// Boolean.
    Boolean,
}

impl FieldType {
    /// JSON-Schema type name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

/// One named input field and its constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Argument name.
    pub name: String,
    /// Declared type.
    pub field_type: FieldType,
    /// Whether callers must supply it.
    pub required: bool,
    /// Value applied when absent.
    pub default: Option<Value>,
    /// Allowed string values.
    pub allowed: Option<Vec<String>>,
    /// Maximum string length, in characters.
    pub max_length: Option<usize>,
    /// Inclusive integer lower bound.
    pub minimum: Option<i64>,
    /// Inclusive integer upper bound.
    pub maximum: Option<i64>,
    /// Human-readable description.
    pub description: String,
}

impl FieldSpec {
    /// A new optional field with no constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            allowed: None,
            max_length: None,
            minimum: None,
            maximum: None,
            description: String::new(),
        }
    }

    /// A string field.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    /// An integer field.
    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    /// A boolean field.
    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    /// Mark the field required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set a default value.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Restrict to a set of string values.
    #[must_use]
    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Set a maximum string length.
    #[must_use]
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Set inclusive integer bounds.
    #[must_use]
    pub fn range(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.minimum = min;
        self.maximum = max;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn to_json_schema(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(self.field_type.as_str()));
        if !self.description.is_empty() {
            prop.insert("description".into(), json!(self.description));
        }
        if let Some(default) = &self.default {
            prop.insert("default".into(), default.clone());
        }
        if let Some(allowed) = &self.allowed {
            prop.insert("enum".into(), json!(allowed));
        }
        if let Some(max) = self.max_length {
            prop.insert("maxLength".into(), json!(max));
        }
        if let Some(min) = self.minimum {
            prop.insert("minimum".into(), json!(min));
        }
        if let Some(max) = self.maximum {
            prop.insert("maximum".into(), json!(max));
        }
        Value::Object(prop)
    }
}

/// Ordered set of input fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    /// Build from fields in declaration order.
    #[must_use]
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Find a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render as a JSON-Schema object for `list_tools`.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_schema_rendering() {
        let schema = InputSchema::new(vec![
            FieldSpec::string("resource_type")
                .required()
                .one_of(["pods", "services"]),
            FieldSpec::string("namespace").with_default("default"),
            FieldSpec::integer("limit").range(Some(1), Some(1000)),
        ]);

        let rendered = schema.to_json_schema();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["required"], json!(["resource_type"]));
        assert_eq!(
            rendered["properties"]["resource_type"]["enum"],
            json!(["pods", "services"])
        );
        assert_eq!(rendered["properties"]["namespace"]["default"], "default");
        assert_eq!(rendered["properties"]["limit"]["maximum"], 1000);
        assert_eq!(rendered["additionalProperties"], false);
    }

    #[test]
    fn test_field_lookup() {
        let schema = InputSchema::new(vec![FieldSpec::boolean("dry_run")]);
        assert_eq!(
            schema.field("dry_run").map(|f| f.field_type),
            Some(FieldType::Boolean)
        );
        assert!(schema.field("missing").is_none());
    }
}
