//! Schema catalog.
//!
//! Entities, their scalar fields and their relation declarations are
//! registered with a [`SchemaRegistry`], then frozen into a [`RelationGraph`]
//! that the engine, the cascade controller and the query layer share.

mod entity;
mod field;
mod graph;
mod registry;
mod relation;
mod types;

pub use entity::EntityDef;
pub use field::FieldDef;
pub use graph::RelationGraph;
pub use registry::SchemaRegistry;
pub use relation::{RelationDef, RelationRole};
pub use types::{Cardinality, DeleteBehavior, EvictionPolicy, RelationSort, ScalarType};
