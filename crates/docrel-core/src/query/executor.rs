//! Query executor for finds, counts and aggregation pipelines.
//!
//! Requests are validated against the relation graph and resolved into a
//! fetch plan before the store is touched; results come back shaped as
//! [`ProjectedDocument`]s.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use docrel_proto::{
    Document, FilterExpr, OrderDirection, OrderSpec, Pagination, Selection, Stage, Value, ID_FIELD,
};
use tracing::debug;

use super::filter::{validate_filter, validate_path};
use super::pipeline::lower;
use super::projection::ProjectionResolver;
use super::shape::{shape, ProjectedDocument};
use crate::catalog::RelationGraph;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::storage::DocumentStore;

/// Sort documents by order specs, breaking ties by identifier ascending.
///
/// Each key uses the first value its path reaches; missing values sort as
/// null, before everything else. An empty order leaves the input as is.
pub fn sort_documents(docs: &mut [Document], order: &[OrderSpec]) {
    if order.is_empty() {
        return;
    }
    docs.sort_by(|a, b| compare_documents(a, b, order));
}

fn compare_documents(a: &Document, b: &Document, order: &[OrderSpec]) -> Ordering {
    for spec in order {
        let left = first_value(a, &spec.field);
        let right = first_value(b, &spec.field);
        let ord = match spec.direction {
            OrderDirection::Asc => left.sort_cmp(&right),
            OrderDirection::Desc => right.sort_cmp(&left),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}

fn first_value(doc: &Document, path: &str) -> Value {
    doc.resolve_path(path).into_iter().next().unwrap_or(Value::Null)
}

/// Query executor that runs reads against a store.
pub struct QueryExecutor<'a> {
    graph: &'a RelationGraph,
    store: &'a dyn DocumentStore,
    config: &'a EngineConfig,
}

impl<'a> QueryExecutor<'a> {
    /// Create a new executor.
    pub fn new(graph: &'a RelationGraph, store: &'a dyn DocumentStore, config: &'a EngineConfig) -> Self {
        Self {
            graph,
            store,
            config,
        }
    }

    /// Find documents of an entity.
    ///
    /// With no order the newest documents come first.
    pub fn find(
        &self,
        entity: &str,
        filter: Option<&FilterExpr>,
        order: &[OrderSpec],
        selection: &Selection,
        page: Pagination,
    ) -> Result<Vec<ProjectedDocument>, Error> {
        let no_joins = BTreeSet::new();
        if let Some(filter) = filter {
            validate_filter(self.graph, entity, filter, &no_joins)?;
        }
        for spec in order {
            validate_path(self.graph, entity, &spec.field, &no_joins)?;
        }
        let plan = ProjectionResolver::new(self.graph, self.config.max_projection_depth)
            .resolve(entity, selection)?;

        let default_order = [OrderSpec::desc(ID_FIELD)];
        let order = if order.is_empty() { &default_order[..] } else { order };
        let docs = self.store.find(entity, filter, order, page)?;
        debug!(entity, matched = docs.len(), depth = plan.depth(), "find");

        shape(self.store, &plan, &docs)
    }

    /// Find the first matching document in default order.
    pub fn find_one(
        &self,
        entity: &str,
        filter: Option<&FilterExpr>,
        selection: &Selection,
    ) -> Result<Option<ProjectedDocument>, Error> {
        let mut found = self.find(entity, filter, &[], selection, Pagination::limit(1))?;
        Ok(found.pop())
    }

    /// Count matching documents.
    pub fn count(&self, entity: &str, filter: Option<&FilterExpr>) -> Result<usize, Error> {
        if let Some(filter) = filter {
            validate_filter(self.graph, entity, filter, &BTreeSet::new())?;
        } else {
            self.graph.entity(entity)?;
        }
        Ok(self.store.find(entity, filter, &[], Pagination::default())?.len())
    }

    /// Run an aggregation pipeline, then apply `page` to its output.
    pub fn aggregate(
        &self,
        entity: &str,
        stages: &[Stage],
        selection: &Selection,
        page: Pagination,
    ) -> Result<Vec<ProjectedDocument>, Error> {
        let (ops, joined) = lower(self.graph, entity, stages)?;
        let plan = ProjectionResolver::new(self.graph, self.config.max_projection_depth)
            .resolve(entity, selection)?;

        let docs = page.apply(self.store.aggregate(entity, &ops)?);
        debug!(
            entity,
            stages = ops.len(),
            joins = joined.len(),
            matched = docs.len(),
            "aggregate"
        );

        shape(self.store, &plan, &docs)
    }
}
