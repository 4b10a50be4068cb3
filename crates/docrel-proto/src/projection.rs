//! Client-supplied nested selections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// What a client asks to see of a document and its relations.
///
/// A root selection is always [`Selection::Nested`]; its keys are scalar
/// field names or relation names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    /// Include a scalar field, or a relation's own documents without further expansion.
    Include,
    /// Expand a relation up to `n` relation hops using every declared relation.
    Depth(u32),
    /// Explicit per-key selection.
    Nested(BTreeMap<String, Selection>),
}

impl Selection {
    /// An empty nested selection, to be filled with the builder methods.
    pub fn nested() -> Self {
        Selection::Nested(BTreeMap::new())
    }

    /// A nested selection including the given scalar fields.
    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selection::Nested(
            names
                .into_iter()
                .map(|n| (n.into(), Selection::Include))
                .collect(),
        )
    }

    /// Add a key with an explicit selection.
    ///
    /// Calling this on a non-nested selection turns it into a nested one.
    pub fn with(mut self, key: impl Into<String>, selection: Selection) -> Self {
        if !matches!(self, Selection::Nested(_)) {
            self = Selection::nested();
        }
        if let Selection::Nested(map) = &mut self {
            map.insert(key.into(), selection);
        }
        self
    }

    /// Include a scalar field or a relation at depth one.
    pub fn include(self, key: impl Into<String>) -> Self {
        self.with(key, Selection::Include)
    }

    /// Expand a relation to a depth bound.
    pub fn depth(self, key: impl Into<String>, depth: u32) -> Self {
        self.with(key, Selection::Depth(depth))
    }

    /// Parse the JSON form used by clients.
    ///
    /// `1` or `true` include, an integer `n > 1` is a depth bound, an object
    /// nests. `0` parses as `Depth(0)` and is rejected during resolution.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, Error> {
        match json {
            serde_json::Value::Bool(true) => Ok(Selection::Include),
            serde_json::Value::Number(n) => match n.as_u64() {
                Some(1) => Ok(Selection::Include),
                Some(depth) => u32::try_from(depth)
                    .map(Selection::Depth)
                    .map_err(|_| Error::InvalidSelection(format!("depth {depth} out of range"))),
                None => Err(Error::InvalidSelection(format!(
                    "depth must be a non-negative integer, got {n}"
                ))),
            },
            serde_json::Value::Object(map) => {
                let mut out = BTreeMap::new();
                for (key, value) in map {
                    out.insert(key.clone(), Selection::from_json(value)?);
                }
                Ok(Selection::Nested(out))
            }
            other => Err(Error::InvalidSelection(other.to_string())),
        }
    }
}
