//! docrel core engine.
//!
//! This crate keeps typed relations between documents consistent on top of a
//! plain key/document store. Every relation is stored on both sides: the
//! referrer holds forward entries, the referenced document holds inverse
//! entries, optionally bounded and sorted windows of denormalized snapshots.
//!
//! # Modules
//!
//! - [`catalog`] - Entity and relation definitions, frozen into a [`RelationGraph`]
//! - [`storage`] - Document stores, batches, transactions and per-document locks
//! - [`sync`] - Inserts and relation edits that update both sides at once
//! - [`cascade`] - Soft and hard deletes
//! - [`query`] - Filters, projections, aggregation pipelines and the query executor
//! - [`consistency`] - Offline audit of stored relations
//! - [`database`] - Facade tying the pieces together

pub mod cascade;
pub mod catalog;
pub mod config;
pub mod consistency;
pub mod context;
pub mod database;
pub mod error;
pub mod query;
pub mod storage;
pub mod sync;

pub use cascade::{CascadeController, CascadeResult};
pub use catalog::{
    Cardinality, DeleteBehavior, EntityDef, EvictionPolicy, FieldDef, RelationDef, RelationGraph,
    RelationRole, RelationSort, ScalarType, SchemaRegistry,
};
pub use config::EngineConfig;
pub use consistency::{audit, AuditReport, Violation, ViolationKind};
pub use context::RequestContext;
pub use database::{Database, DeleteOutcome, FindOptions};
pub use error::{CascadeError, Error};
pub use query::{
    FetchPlan, FilterEvaluator, PipelineBuilder, ProjectedDocument, ProjectedRelation,
    ProjectionResolver, QueryExecutor,
};
pub use storage::{Batch, DocumentStore, MemoryStore, SledStore, StorageConfig, Transaction};
pub use sync::{RelationRef, RelationSyncEngine};

pub use docrel_proto as proto;
