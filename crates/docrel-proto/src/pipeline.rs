//! Aggregation pipeline stages.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::query::{FilterExpr, OrderSpec};

/// One stage of an aggregation pipeline. Stages run in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    /// Keep documents matching the filter.
    Match(FilterExpr),
    /// Reorder documents. Ties fall back to identifier ascending.
    Sort(Vec<OrderSpec>),
    /// Drop the first `n` documents.
    Skip(usize),
    /// Keep at most `n` documents.
    Limit(usize),
    /// Replace a relation's snapshots with the full related documents.
    Lookup { relation: String },
}

impl Stage {
    /// Create a match stage.
    pub fn matching(filter: FilterExpr) -> Self {
        Stage::Match(filter)
    }

    /// Create a lookup stage.
    pub fn lookup(relation: impl Into<String>) -> Self {
        Stage::Lookup {
            relation: relation.into(),
        }
    }

    /// Whether this stage expands relation data.
    pub fn is_expansion(&self) -> bool {
        matches!(self, Stage::Lookup { .. })
    }

    /// Parse a JSON pipeline: an array of single-key stage objects.
    ///
    /// `[{"$lookup": "country"}, {"$match": {...}}, {"$sort": {"population": -1}},
    /// {"$skip": 5}, {"$limit": 10}]`.
    pub fn pipeline_from_json(json: &serde_json::Value) -> Result<Vec<Stage>, Error> {
        let stages = json
            .as_array()
            .ok_or_else(|| Error::InvalidPipeline("pipeline must be an array".into()))?;
        stages.iter().map(Stage::from_json).collect()
    }

    /// Parse one JSON stage.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, Error> {
        let object = json
            .as_object()
            .filter(|o| o.len() == 1)
            .ok_or_else(|| Error::InvalidPipeline(format!("stage must have one key: {json}")))?;
        let Some((name, body)) = object.iter().next() else {
            return Err(Error::InvalidPipeline("empty stage".into()));
        };

        let count = |body: &serde_json::Value| {
            body.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| Error::InvalidPipeline(format!("{name} expects a count")))
        };

        match name.as_str() {
            "$match" => Ok(Stage::Match(FilterExpr::from_json(body)?)),
            "$skip" => Ok(Stage::Skip(count(body)?)),
            "$limit" => Ok(Stage::Limit(count(body)?)),
            "$lookup" => body
                .as_str()
                .map(Stage::lookup)
                .ok_or_else(|| Error::InvalidPipeline("$lookup expects a relation name".into())),
            "$sort" => {
                let keys = body
                    .as_object()
                    .ok_or_else(|| Error::InvalidPipeline("$sort expects an object".into()))?;
                keys.iter()
                    .map(|(field, dir)| match dir.as_i64() {
                        Some(1) => Ok(OrderSpec::asc(field.clone())),
                        Some(-1) => Ok(OrderSpec::desc(field.clone())),
                        _ => Err(Error::InvalidPipeline(format!(
                            "sort direction for {field} must be 1 or -1"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(Stage::Sort)
            }
            other => Err(Error::InvalidPipeline(format!("unknown stage {other}"))),
        }
    }
}
