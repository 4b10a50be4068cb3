//! Core error types.

use docrel_proto::DocId;
use thiserror::Error;

/// Core engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Entity type is not registered.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Relation is not declared on the entity type.
    #[error("unknown relation {relation} on {entity}")]
    UnknownRelation { entity: String, relation: String },

    /// Field is not declared on the entity type.
    #[error("unknown field {field} on {entity}")]
    UnknownField { entity: String, field: String },

    /// A non-optional relation would be left empty.
    #[error("missing required relation {relation} on {entity}")]
    MissingRequiredRelation { entity: String, relation: String },

    /// A relation would hold more entries than it allows.
    #[error("cardinality violation on {entity}.{relation}: {reason}")]
    CardinalityViolation {
        entity: String,
        relation: String,
        reason: String,
    },

    /// A referenced document does not exist.
    #[error("dangling reference to {entity} {id}")]
    DanglingReference { entity: String, id: DocId },

    /// A projection asks for more relation hops than allowed.
    #[error("projection depth {depth} exceeds maximum {max}")]
    CycleDepthExceeded { depth: u32, max: u32 },

    /// The backing store failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] sled::Error),

    /// Cascading delete failed.
    #[error("cascade error: {0}")]
    Cascade(#[from] CascadeError),

    /// A field value does not match its declared kind.
    #[error("invalid value for {entity}.{field}: {reason}")]
    InvalidValue {
        entity: String,
        field: String,
        reason: String,
    },

    /// The request is well-formed but not allowed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Schema registration or validation failed.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Document not found.
    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: DocId },

    /// Could not lock every touched document within the retry limit.
    #[error("lock contention after {attempts} attempts")]
    LockContention { attempts: usize },

    /// Document encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] docrel_proto::Error),
}

impl Error {
    /// Whether this error was raised by request validation, before any store access.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::UnknownEntity(_)
                | Error::UnknownRelation { .. }
                | Error::UnknownField { .. }
                | Error::MissingRequiredRelation { .. }
                | Error::CardinalityViolation { .. }
                | Error::InvalidValue { .. }
                | Error::InvalidRequest(_)
                | Error::CycleDepthExceeded { .. }
        )
    }

    pub(crate) fn unknown_relation(entity: &str, relation: &str) -> Self {
        Error::UnknownRelation {
            entity: entity.to_string(),
            relation: relation.to_string(),
        }
    }

    pub(crate) fn unknown_field(entity: &str, field: &str) -> Self {
        Error::UnknownField {
            entity: entity.to_string(),
            field: field.to_string(),
        }
    }

    pub(crate) fn cardinality(entity: &str, relation: &str, reason: impl Into<String>) -> Self {
        Error::CardinalityViolation {
            entity: entity.to_string(),
            relation: relation.to_string(),
            reason: reason.into(),
        }
    }
}

/// Cascading delete errors.
#[derive(Debug, Error)]
pub enum CascadeError {
    /// Cascade recursion went deeper than allowed.
    #[error("cascade depth {depth} exceeds maximum")]
    MaxDepthExceeded { depth: usize },

    /// A restricting relation still has referrers.
    #[error("cannot delete {entity}: {count} {referencing_entity} document(s) reference it")]
    RestrictViolation {
        entity: String,
        referencing_entity: String,
        count: usize,
    },

    /// A dependent document could not be read or removed.
    #[error("dependent {entity} {id} could not be removed: {reason}")]
    DependentFailed {
        entity: String,
        id: DocId,
        reason: String,
    },
}
