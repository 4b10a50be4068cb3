//! docrel protocol types.
//!
//! This crate defines the types exchanged between the relation engine and its
//! callers: runtime values and identifiers, stored documents with their
//! relation entries, filter expressions, projection selections and
//! aggregation pipeline stages.
//!
//! # Modules
//!
//! - [`value`] - Runtime values and document identifiers
//! - [`document`] - Stored documents and relation entries
//! - [`query`] - Filter, ordering and pagination types
//! - [`projection`] - Client-supplied nested selections
//! - [`pipeline`] - Aggregation pipeline stages
//! - [`error`] - Protocol error types
//!
//! All types derive `serde::Serialize` and `serde::Deserialize`.

pub mod document;
pub mod error;
pub mod pipeline;
pub mod projection;
pub mod query;
pub mod value;

pub use document::{Document, RelationEntry, ID_FIELD};
pub use error::Error;
pub use pipeline::Stage;
pub use projection::Selection;
pub use query::{FilterExpr, OrderDirection, OrderSpec, Pagination};
pub use value::{DocId, Value};
