//! Field definitions for entities.

use docrel_proto::Value;

use super::types::ScalarType;

/// A scalar field definition within an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    pub scalar: ScalarType,
    /// Whether the field must be present and non-null on insert.
    pub required: bool,
}

impl FieldDef {
    /// Create a new required field.
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar,
            required: true,
        }
    }

    /// Create an optional field (required = false).
    pub fn optional(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar,
            required: false,
        }
    }

    /// Check a value against this field, returning the stored form.
    pub fn accept(&self, value: Value) -> Result<Value, String> {
        if value.is_null() && self.required {
            return Err("required field cannot be null".to_string());
        }
        if matches!(value, Value::Float64(f) if !f.is_finite()) {
            return Err(format!("{value:?} is not a finite number"));
        }
        let shown = format!("{value:?}");
        self.scalar
            .coerce(value)
            .ok_or_else(|| format!("expected {:?}, got {shown}", self.scalar))
    }
}
