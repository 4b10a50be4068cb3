//! Runtime values and document identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Size of a document identifier in bytes.
pub const DOC_ID_SIZE: usize = 16;

/// A document identifier.
///
/// Layout: `[timestamp_micros (8 bytes, big-endian)][sequence (8 bytes, big-endian)]`.
/// Byte order therefore matches creation order, so sorting by `_id`
/// descending yields the most recently created documents first.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocId([u8; DOC_ID_SIZE]);

impl DocId {
    /// Generate a new identifier, strictly greater than every identifier
    /// generated earlier by this process.
    pub fn generate() -> Self {
        static LAST_TS: AtomicU64 = AtomicU64::new(0);
        static SEQUENCE: AtomicU64 = AtomicU64::new(0);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        // Never hand out a timestamp at or below the previous one.
        let mut last = LAST_TS.load(AtomicOrdering::SeqCst);
        let ts = loop {
            let candidate = now.max(last + 1);
            match LAST_TS.compare_exchange(
                last,
                candidate,
                AtomicOrdering::SeqCst,
                AtomicOrdering::SeqCst,
            ) {
                Ok(_) => break candidate,
                Err(actual) => last = actual,
            }
        };
        let seq = SEQUENCE.fetch_add(1, AtomicOrdering::SeqCst);

        let mut id = [0u8; DOC_ID_SIZE];
        id[..8].copy_from_slice(&ts.to_be_bytes());
        id[8..].copy_from_slice(&seq.to_be_bytes());
        Self(id)
    }

    /// Build an identifier from raw bytes.
    pub const fn from_bytes(bytes: [u8; DOC_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; DOC_ID_SIZE] {
        &self.0
    }

    /// Lowercase hex rendering (32 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 32-character hex identifier. Dashes are ignored.
    pub fn parse_hex(s: &str) -> Result<Self, Error> {
        let cleaned: String = s.chars().filter(|c| *c != '-').collect();
        let bytes = hex::decode(&cleaned).map_err(|_| Error::InvalidId(s.to_string()))?;
        let bytes: [u8; DOC_ID_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidId(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocId({})", self.to_hex())
    }
}

impl FromStr for DocId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

impl Serialize for DocId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DocId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DocId::parse_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A runtime value stored in a document field or used in a filter.
///
/// Maps to the scalar kinds declared in the schema registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Timestamp as microseconds since Unix epoch.
    Timestamp(i64),
    /// Document identifier.
    Id(DocId),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64. Integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            Value::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a document identifier.
    ///
    /// Hex strings are accepted so that identifiers coming from JSON input
    /// compare equal to stored identifiers.
    pub fn as_id(&self) -> Option<DocId> {
        match self {
            Value::Id(id) => Some(*id),
            Value::String(s) => DocId::parse_hex(s).ok(),
            _ => None,
        }
    }

    /// Compare two values.
    ///
    /// Returns `None` for incompatible kinds. Null sorts before everything.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Float64(b)) => (*a as f64).partial_cmp(b),
            (Value::Float64(a), Value::Int64(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Id(a), Value::Id(b)) => Some(a.cmp(b)),
            (Value::Id(a), Value::String(s)) => DocId::parse_hex(s).ok().map(|b| a.cmp(&b)),
            (Value::String(s), Value::Id(b)) => DocId::parse_hex(s).ok().map(|a| a.cmp(b)),
            _ => None,
        }
    }

    /// Total ordering used for sorting; incompatible kinds compare equal.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        self.compare(other).unwrap_or(Ordering::Equal)
    }

    /// Render as JSON. Identifiers become hex strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int64(i) => serde_json::Value::from(*i),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(t) => serde_json::Value::from(*t),
            Value::Id(id) => serde_json::Value::String(id.to_hex()),
        }
    }

    /// Convert a JSON scalar into a value.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, Error> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int64(i)),
                None => n
                    .as_f64()
                    .map(Value::Float64)
                    .ok_or_else(|| Error::UnsupportedValue(n.to_string())),
            },
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(Error::UnsupportedValue(other.to_string())),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<DocId> for Value {
    fn from(v: DocId) -> Self {
        Value::Id(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
