//! Core type definitions for the catalog.

use docrel_proto::{OrderDirection, Value, ID_FIELD};

/// Scalar data types a document field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
    /// Document identifier.
    Id,
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Int64 | ScalarType::Float64)
    }

    /// Convert a value to this type, widening where lossless.
    ///
    /// Returns `None` when the value's kind does not fit or a float is not
    /// finite. Null is passed through; requiredness is checked by the field.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (ScalarType::Bool, v @ Value::Bool(_)) => Some(v),
            (ScalarType::Int64, v @ Value::Int64(_)) => Some(v),
            (ScalarType::Float64, Value::Float64(f)) if f.is_finite() => Some(Value::Float64(f)),
            (ScalarType::Float64, Value::Int64(i)) => Some(Value::Float64(i as f64)),
            (ScalarType::String, v @ Value::String(_)) => Some(v),
            (ScalarType::Timestamp, v @ Value::Timestamp(_)) => Some(v),
            (ScalarType::Timestamp, Value::Int64(i)) => Some(Value::Timestamp(i)),
            (ScalarType::Id, v @ Value::Id(_)) => Some(v),
            (ScalarType::Id, Value::String(s)) => {
                docrel_proto::DocId::parse_hex(&s).ok().map(Value::Id)
            }
            _ => None,
        }
    }
}

/// Whether a relation holds at most one or many references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// At most one reference.
    Single,
    /// Any number of references, optionally bounded by a limit.
    Multiple,
}

/// What happens to referrers when the referenced document is hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteBehavior {
    /// Delete referrers left without a required reference.
    Cascade,
    /// Remove the reference and keep the referrer.
    Detach,
    /// Refuse the delete while referrers exist.
    Restrict,
}

/// What to do when adding to a full bounded relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EvictionPolicy {
    /// Drop the lowest-ranked entries.
    #[default]
    Evict,
    /// Reject the write.
    Forbid,
}

/// Declared ordering of a relation's entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationSort {
    /// Field of the related document, or `_id`.
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl RelationSort {
    /// Ascending by a field.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Descending by a field.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// Whether the sort key is the identifier.
    pub fn is_by_id(&self) -> bool {
        self.field == ID_FIELD
    }
}

impl Default for RelationSort {
    /// Most recently created first.
    fn default() -> Self {
        Self::desc(ID_FIELD)
    }
}
