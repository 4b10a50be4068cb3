//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A document identifier could not be parsed.
    #[error("invalid document id: {0}")]
    InvalidId(String),

    /// A selection document has an unsupported shape.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// A JSON filter document has an unsupported shape.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A JSON pipeline document has an unsupported shape.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// A JSON value cannot be represented as a [`crate::Value`].
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),
}
