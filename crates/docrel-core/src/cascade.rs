//! Cascade controller for deletes.
//!
//! A soft delete removes the document and every edge touching it. A hard
//! delete also removes referrers left without a required relation, when
//! that relation cascades:
//! - CASCADE: orphaned referrers are deleted recursively
//! - DETACH: referrers keep living without the reference
//! - RESTRICT: the delete is refused while referrers exist

use std::collections::HashSet;

use docrel_proto::{DocId, FilterExpr, ID_FIELD};
use tracing::{debug, info, info_span};

use crate::catalog::{DeleteBehavior, RelationGraph};
use crate::error::{CascadeError, Error};
use crate::storage::Transaction;
use crate::sync::{Detachment, RelationSyncEngine};

/// Result of a delete.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CascadeResult {
    /// Documents removed, in removal order.
    pub deleted: Vec<(String, DocId)>,
    /// Relation entries removed from surviving documents.
    pub detached: usize,
}

impl CascadeResult {
    /// Create an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything was removed.
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
    }

    /// Total number of documents affected.
    pub fn affected_count(&self) -> usize {
        self.deleted.len() + self.detached
    }
}

/// Runs deletes against a transaction.
pub struct CascadeController<'g> {
    graph: &'g RelationGraph,
    engine: RelationSyncEngine<'g>,
    max_depth: usize,
}

impl<'g> CascadeController<'g> {
    /// Create a controller that aborts cascades deeper than `max_depth`.
    pub fn new(graph: &'g RelationGraph, max_depth: usize) -> Self {
        Self {
            graph,
            engine: RelationSyncEngine::new(graph),
            max_depth,
        }
    }

    /// Delete a document.
    ///
    /// A missing document yields an empty result. Restricting relations are
    /// checked before anything is staged.
    pub fn delete(
        &self,
        tx: &mut Transaction<'_>,
        entity: &str,
        id: DocId,
        cascade: bool,
    ) -> Result<CascadeResult, Error> {
        let span = info_span!("delete", entity, %id, cascade);
        let _guard = span.enter();

        debug!(phase = "resolving");
        self.graph.entity(entity)?;
        let mut result = CascadeResult::new();
        let Some(doc) = tx.get(entity, id)? else {
            debug!(phase = "done", "nothing to delete");
            return Ok(result);
        };
        self.check_restrict(tx, entity, id)?;

        if cascade {
            debug!(phase = "cascading");
            let mut visited = HashSet::new();
            self.delete_recursive(tx, entity, id, &mut result, &mut visited, 0)?;
        } else {
            debug!(phase = "detaching");
            let detachment = self.engine.detach(tx, entity, &doc)?;
            result.detached += detachment.edges;
            debug!(phase = "deleting");
            tx.delete(entity, id);
            result.deleted.push((entity.to_string(), id));
        }

        info!(
            phase = "done",
            deleted = result.deleted.len(),
            detached = result.detached,
            "delete finished"
        );
        Ok(result)
    }

    fn delete_recursive(
        &self,
        tx: &mut Transaction<'_>,
        entity: &str,
        id: DocId,
        result: &mut CascadeResult,
        visited: &mut HashSet<(String, DocId)>,
        depth: usize,
    ) -> Result<(), Error> {
        if depth > self.max_depth {
            return Err(CascadeError::MaxDepthExceeded { depth }.into());
        }
        if !visited.insert((entity.to_string(), id)) {
            return Ok(());
        }

        let detachment = match self.detach_one(tx, entity, id, depth) {
            Ok(Some(detachment)) => detachment,
            Ok(None) => return Ok(()),
            Err(err) if depth > 0 => return Err(dependent_failed(entity, id, err)),
            Err(err) => return Err(err),
        };

        result.detached += detachment.edges;
        tx.delete(entity, id);
        result.deleted.push((entity.to_string(), id));
        debug!(phase = "deleting", entity, %id, depth);

        for referrer in detachment.referrers {
            let relation = referrer.relation;
            if referrer.orphaned && relation.delete_behavior() == DeleteBehavior::Cascade {
                self.delete_recursive(
                    tx,
                    &relation.from_entity,
                    referrer.id,
                    result,
                    visited,
                    depth + 1,
                )?;
            }
        }
        Ok(())
    }

    /// Detach one document of the cascade; `None` when it is already gone.
    fn detach_one(
        &self,
        tx: &mut Transaction<'_>,
        entity: &str,
        id: DocId,
        depth: usize,
    ) -> Result<Option<Detachment<'g>>, Error> {
        let Some(doc) = tx.get(entity, id)? else {
            return Ok(None);
        };
        if depth > 0 {
            self.check_restrict(tx, entity, id)?;
        }
        self.engine.detach(tx, entity, &doc).map(Some)
    }

    /// Refuse the delete if a restricting relation still references the document.
    fn check_restrict(&self, tx: &mut Transaction<'_>, entity: &str, id: DocId) -> Result<(), Error> {
        for relation in self.graph.relations_to(entity) {
            if relation.delete_behavior() != DeleteBehavior::Restrict {
                continue;
            }
            let path = format!("{}.{ID_FIELD}", relation.name);
            let count = tx.find_ids(&relation.from_entity, &FilterExpr::eq(path, id))?.len();
            if count > 0 {
                return Err(CascadeError::RestrictViolation {
                    entity: entity.to_string(),
                    referencing_entity: relation.from_entity.clone(),
                    count,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Wrap a failure on a dependent document; cascade errors pass through.
fn dependent_failed(entity: &str, id: DocId, err: Error) -> Error {
    match err {
        Error::Cascade(_) => err,
        other => CascadeError::DependentFailed {
            entity: entity.to_string(),
            id,
            reason: other.to_string(),
        }
        .into(),
    }
}
