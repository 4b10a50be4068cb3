//! Database facade combining the relation graph, a store and the engines.

use std::collections::BTreeMap;
use std::sync::Arc;

use docrel_proto::{DocId, Document, FilterExpr, OrderSpec, Pagination, Selection, Stage, Value};
use tracing::info_span;

use crate::cascade::{CascadeController, CascadeResult};
use crate::catalog::RelationGraph;
use crate::config::EngineConfig;
use crate::consistency::{audit, AuditReport};
use crate::context::RequestContext;
use crate::error::Error;
use crate::query::{ProjectedDocument, QueryExecutor};
use crate::storage::{DocumentStore, LockTable};
use crate::sync::{RelationRef, RelationSyncEngine};

/// Result of [`Database::delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// 1 when the document existed and was removed, 0 otherwise.
    pub success: u8,
    /// Everything the delete removed.
    pub cascade: CascadeResult,
}

/// Options for [`Database::find`].
#[derive(Debug, Clone, PartialEq)]
pub struct FindOptions {
    /// Filter; `None` matches everything.
    pub filter: Option<FilterExpr>,
    /// Result order; empty means newest first.
    pub order: Vec<OrderSpec>,
    /// What to return of each document.
    pub selection: Selection,
    /// Results to skip.
    pub skip: usize,
    /// Results to return; `None` uses the configured page size.
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Match everything, scalars only, default page.
    pub fn new() -> Self {
        Self {
            filter: None,
            order: Vec::new(),
            selection: Selection::Include,
            skip: 0,
            limit: None,
        }
    }

    /// Set the filter.
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Add a sort key.
    pub fn with_order(mut self, spec: OrderSpec) -> Self {
        self.order.push(spec);
        self
    }

    /// Set the projection.
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Set the number of results to skip.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Set the maximum number of results.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Default for FindOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry point for reads and writes.
///
/// Holds the frozen relation graph and the store it was opened with; every
/// mutation runs under per-document locks and commits as one batch.
pub struct Database {
    graph: Arc<RelationGraph>,
    store: Arc<dyn DocumentStore>,
    locks: LockTable,
    config: EngineConfig,
}

impl Database {
    /// Open a database over a graph and a store.
    pub fn open(graph: Arc<RelationGraph>, store: Arc<dyn DocumentStore>, config: EngineConfig) -> Self {
        Self {
            graph,
            store,
            locks: LockTable::new(),
            config,
        }
    }

    /// Get the relation graph.
    pub fn graph(&self) -> &RelationGraph {
        &self.graph
    }

    /// Get the store.
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a query executor for this database.
    pub fn executor(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(&self.graph, self.store.as_ref(), &self.config)
    }

    fn engine(&self) -> RelationSyncEngine<'_> {
        RelationSyncEngine::new(&self.graph)
    }

    /// Insert one document with its relations.
    pub fn insert(
        &self,
        ctx: &RequestContext,
        entity: &str,
        fields: BTreeMap<String, Value>,
        relations: &[RelationRef],
    ) -> Result<Document, Error> {
        let span = info_span!("insert", request_id = ctx.request_id, actor = ctx.actor_name(), entity);
        let _guard = span.enter();

        let id = DocId::generate();
        let engine = self.engine();
        self.locks
            .execute(self.store.as_ref(), self.config.lock_retry_limit, |tx| {
                engine.insert(tx, entity, id, fields.clone(), relations)
            })
    }

    /// Insert several documents sharing the same relations, all or none.
    pub fn insert_many(
        &self,
        ctx: &RequestContext,
        entity: &str,
        docs: Vec<BTreeMap<String, Value>>,
        relations: &[RelationRef],
    ) -> Result<Vec<Document>, Error> {
        let span = info_span!(
            "insert_many",
            request_id = ctx.request_id,
            actor = ctx.actor_name(),
            entity,
            count = docs.len()
        );
        let _guard = span.enter();

        let ids: Vec<DocId> = docs.iter().map(|_| DocId::generate()).collect();
        let engine = self.engine();
        self.locks
            .execute(self.store.as_ref(), self.config.lock_retry_limit, |tx| {
                ids.iter()
                    .zip(&docs)
                    .map(|(id, fields)| engine.insert(tx, entity, *id, fields.clone(), relations))
                    .collect()
            })
    }

    /// Add references on every document matching a filter.
    pub fn add_relation(
        &self,
        ctx: &RequestContext,
        entity: &str,
        filter: &FilterExpr,
        relation: &RelationRef,
        replace: bool,
    ) -> Result<Vec<Document>, Error> {
        let span = info_span!(
            "add_relation",
            request_id = ctx.request_id,
            actor = ctx.actor_name(),
            entity,
            relation = %relation.relation
        );
        let _guard = span.enter();

        let engine = self.engine();
        self.locks
            .execute(self.store.as_ref(), self.config.lock_retry_limit, |tx| {
                engine.add_relation(tx, entity, filter, relation, replace)
            })
    }

    /// Remove references from every document matching a filter.
    pub fn remove_relation(
        &self,
        ctx: &RequestContext,
        entity: &str,
        filter: &FilterExpr,
        relation: &str,
        targets: &[DocId],
    ) -> Result<Vec<Document>, Error> {
        let span = info_span!(
            "remove_relation",
            request_id = ctx.request_id,
            actor = ctx.actor_name(),
            entity,
            relation
        );
        let _guard = span.enter();

        let engine = self.engine();
        self.locks
            .execute(self.store.as_ref(), self.config.lock_retry_limit, |tx| {
                engine.remove_relation(tx, entity, filter, relation, targets)
            })
    }

    /// Set scalar fields on every document matching a filter.
    pub fn update(
        &self,
        ctx: &RequestContext,
        entity: &str,
        filter: &FilterExpr,
        set: &BTreeMap<String, Value>,
    ) -> Result<Vec<Document>, Error> {
        let span = info_span!("update", request_id = ctx.request_id, actor = ctx.actor_name(), entity);
        let _guard = span.enter();

        let engine = self.engine();
        self.locks
            .execute(self.store.as_ref(), self.config.lock_retry_limit, |tx| {
                engine.update(tx, entity, filter, set)
            })
    }

    /// Delete a document; with `cascade`, orphaned referrers go too.
    pub fn delete(
        &self,
        ctx: &RequestContext,
        entity: &str,
        id: DocId,
        cascade: bool,
    ) -> Result<DeleteOutcome, Error> {
        let span = info_span!("remove", request_id = ctx.request_id, actor = ctx.actor_name(), entity);
        let _guard = span.enter();

        let controller = CascadeController::new(&self.graph, self.config.max_cascade_depth);
        let result = self
            .locks
            .execute(self.store.as_ref(), self.config.lock_retry_limit, |tx| {
                controller.delete(tx, entity, id, cascade)
            })?;
        Ok(DeleteOutcome {
            success: u8::from(!result.is_empty()),
            cascade: result,
        })
    }

    /// Find documents.
    pub fn find(&self, entity: &str, options: &FindOptions) -> Result<Vec<ProjectedDocument>, Error> {
        let page = Pagination {
            skip: options.skip,
            limit: Some(options.limit.unwrap_or(self.config.default_page_size)),
        };
        self.executor().find(
            entity,
            options.filter.as_ref(),
            &options.order,
            &options.selection,
            page,
        )
    }

    /// Find the newest matching document.
    pub fn find_one(
        &self,
        entity: &str,
        filter: Option<&FilterExpr>,
        selection: &Selection,
    ) -> Result<Option<ProjectedDocument>, Error> {
        self.executor().find_one(entity, filter, selection)
    }

    /// Count matching documents.
    pub fn count(&self, entity: &str, filter: Option<&FilterExpr>) -> Result<usize, Error> {
        self.executor().count(entity, filter)
    }

    /// Run an aggregation pipeline. `limit: None` returns every result.
    pub fn aggregate(
        &self,
        entity: &str,
        stages: &[Stage],
        selection: &Selection,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<ProjectedDocument>, Error> {
        self.executor()
            .aggregate(entity, stages, selection, Pagination { skip, limit })
    }

    /// Check every stored relation for consistency.
    pub fn audit(&self) -> Result<AuditReport, Error> {
        audit(&self.graph, self.store.as_ref())
    }
}
