//! Offline consistency audit of stored relations.
//!
//! Checks, for every stored relation entry:
//! - the referenced document exists
//! - an inverse entry is backed by a forward entry on the referrer
//! - a forward entry is mirrored on every unbounded inverse
//! - bounded relations hold no more than their capacity
//! - entries are in rank order

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use docrel_proto::{DocId, Document};
use tracing::{debug, warn};

use crate::catalog::RelationGraph;
use crate::error::Error;
use crate::storage::DocumentStore;
use crate::sync::is_ordered;

/// Kind of relation inconsistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Entry points at a document that does not exist.
    Dangling,
    /// Forward entry missing from an inverse that lists every referrer.
    MissingInverse,
    /// Inverse entry with no forward entry behind it.
    MissingForward,
    /// More entries than the relation allows.
    LimitExceeded,
    /// Entries not in the declared order.
    OutOfOrder,
}

/// One inconsistency found by [`audit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// What is wrong.
    pub kind: ViolationKind,
    /// Entity of the document holding the relation.
    pub entity: String,
    /// Document holding the relation.
    pub id: DocId,
    /// Relation name.
    pub relation: String,
    /// Referenced document, when the violation is about one entry.
    pub target: Option<DocId>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}.{} on {}", self.kind, self.entity, self.relation, self.id)?;
        if let Some(target) = &self.target {
            write!(f, " -> {target}")?;
        }
        Ok(())
    }
}

/// Outcome of an audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Documents examined.
    pub documents: usize,
    /// Inconsistencies found.
    pub violations: Vec<Violation>,
}

impl AuditReport {
    /// Whether no violation was found.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violations of one kind.
    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }
}

/// Scan every collection and check its relations.
pub fn audit(graph: &RelationGraph, store: &dyn DocumentStore) -> Result<AuditReport, Error> {
    let mut collections: BTreeMap<&str, HashMap<DocId, Document>> = BTreeMap::new();
    for entity in graph.entity_names() {
        let docs = store.scan(entity)?;
        collections.insert(entity, docs.into_iter().map(|d| (d.id, d)).collect());
    }
    let lookup = |entity: &str, id: &DocId| collections.get(entity).and_then(|c| c.get(id));

    let mut report = AuditReport::default();
    for (entity, docs) in &collections {
        for doc in docs.values() {
            report.documents += 1;
            for relation in graph.relations_from(entity) {
                let entries = doc.relation(&relation.name);
                let violation = |kind, target| Violation {
                    kind,
                    entity: entity.to_string(),
                    id: doc.id,
                    relation: relation.name.clone(),
                    target,
                };

                if relation.capacity().is_some_and(|cap| entries.len() > cap) {
                    report.violations.push(violation(ViolationKind::LimitExceeded, None));
                }
                if !is_ordered(&relation.sort, entries) {
                    report.violations.push(violation(ViolationKind::OutOfOrder, None));
                }

                for entry in entries {
                    let Some(target) = lookup(&relation.to_entity, &entry.id) else {
                        report
                            .violations
                            .push(violation(ViolationKind::Dangling, Some(entry.id)));
                        continue;
                    };
                    if relation.is_forward() {
                        for inverse in graph.inverses_of(relation) {
                            if inverse.is_unbounded() && !target.references(&inverse.name, &doc.id) {
                                report
                                    .violations
                                    .push(violation(ViolationKind::MissingInverse, Some(entry.id)));
                            }
                        }
                    } else if let Some(forward) = graph.forward_of(relation) {
                        if !target.references(&forward.name, &doc.id) {
                            report
                                .violations
                                .push(violation(ViolationKind::MissingForward, Some(entry.id)));
                        }
                    }
                }
            }
        }
    }

    if report.is_clean() {
        debug!(documents = report.documents, "audit clean");
    } else {
        warn!(
            documents = report.documents,
            violations = report.violations.len(),
            "audit found violations"
        );
    }
    Ok(report)
}
