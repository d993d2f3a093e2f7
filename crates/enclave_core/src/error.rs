use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("partial update requires an object, found {found}")]
    NotAnObject { found: &'static str },
}

impl ContainerError {
    pub(crate) fn not_an_object(value: &Value) -> Self {
        ContainerError::NotAnObject {
            found: value_kind(value),
        }
    }
}

/// Short name of a value's JSON kind, used in diagnostics
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
