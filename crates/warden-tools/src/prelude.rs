//! Prelude module - commonly used types for convenient import.

pub use crate::{
    FieldSpec, FieldType, InputSchema, Invocation, RegistryError, Tool, ToolRegistry,
    ValidationError, validate,
};
