//! Shaping stored documents into projected results.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use docrel_proto::{DocId, Document, RelationEntry, Value, ID_FIELD};
use serde::{Serialize, Serializer};

use super::projection::{FetchPlan, TraversalStep};
use crate::catalog::Cardinality;
use crate::error::Error;
use crate::storage::DocumentStore;

/// A document reduced to what a fetch plan asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedDocument {
    /// Document identifier.
    pub id: DocId,
    /// Requested scalar fields (absent fields are omitted).
    pub fields: BTreeMap<String, Value>,
    /// Requested relations.
    pub relations: BTreeMap<String, ProjectedRelation>,
}

/// The projected contents of one relation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedRelation {
    /// A single relation; `None` when unset.
    One(Option<Box<ProjectedDocument>>),
    /// A multiple relation, in stored order.
    Many(Vec<ProjectedDocument>),
}

impl ProjectedDocument {
    /// Read a scalar field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Documents of a multiple relation (empty when not projected).
    pub fn many(&self, relation: &str) -> &[ProjectedDocument] {
        match self.relations.get(relation) {
            Some(ProjectedRelation::Many(docs)) => docs,
            _ => &[],
        }
    }

    /// Document of a single relation.
    pub fn one(&self, relation: &str) -> Option<&ProjectedDocument> {
        match self.relations.get(relation) {
            Some(ProjectedRelation::One(doc)) => doc.as_deref(),
            _ => None,
        }
    }

    /// Render as a JSON object with `_id` as a hex string.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert(ID_FIELD.to_string(), serde_json::Value::String(self.id.to_hex()));
        for (name, value) in &self.fields {
            if name != ID_FIELD {
                object.insert(name.clone(), value.to_json());
            }
        }
        for (name, relation) in &self.relations {
            let rendered = match relation {
                ProjectedRelation::One(Some(doc)) => doc.to_json(),
                ProjectedRelation::One(None) => serde_json::Value::Null,
                ProjectedRelation::Many(docs) => {
                    serde_json::Value::Array(docs.iter().map(ProjectedDocument::to_json).collect())
                }
            };
            object.insert(name.clone(), rendered);
        }
        serde_json::Value::Object(object)
    }
}

impl Serialize for ProjectedDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Shape documents by a plan, fetching related documents as needed.
///
/// A leaf step is answered from relation snapshots when every requested
/// field is present there; otherwise, and for every step with further
/// steps below it, targets are fetched with one `get_many` per step.
pub fn shape(
    store: &dyn DocumentStore,
    plan: &FetchPlan,
    docs: &[Document],
) -> Result<Vec<ProjectedDocument>, Error> {
    let mut out: Vec<ProjectedDocument> = docs.iter().map(|d| scalars(plan, d)).collect();

    for step in &plan.steps {
        let resolved = resolve_step(store, step, docs)?;
        for (doc, projected) in docs.iter().zip(out.iter_mut()) {
            let entries = limited(step, doc.relation(&step.relation));
            let mut items = Vec::with_capacity(entries.len());
            for entry in entries {
                if let Some(item) = resolved.get(&entry.id) {
                    items.push(item.clone());
                } else if let Some(item) = from_snapshot(&step.plan, entry) {
                    items.push(item);
                }
            }
            let relation = match step.cardinality {
                Cardinality::Single => ProjectedRelation::One(items.into_iter().next().map(Box::new)),
                Cardinality::Multiple => ProjectedRelation::Many(items),
            };
            projected.relations.insert(step.relation.clone(), relation);
        }
    }
    Ok(out)
}

/// Shape the targets of one step that cannot come from snapshots.
fn resolve_step(
    store: &dyn DocumentStore,
    step: &TraversalStep,
    docs: &[Document],
) -> Result<HashMap<DocId, ProjectedDocument>, Error> {
    let mut joined: BTreeMap<DocId, Document> = BTreeMap::new();
    let mut to_fetch: BTreeSet<DocId> = BTreeSet::new();

    for doc in docs {
        for entry in limited(step, doc.relation(&step.relation)) {
            if let Some(full) = &entry.joined {
                joined.insert(entry.id, (**full).clone());
            } else if !step.plan.steps.is_empty() || !snapshot_covers(&step.plan, entry) {
                to_fetch.insert(entry.id);
            }
        }
    }
    to_fetch.retain(|id| !joined.contains_key(id));

    let mut targets: Vec<Document> = joined.into_values().collect();
    if !to_fetch.is_empty() {
        let ids: Vec<DocId> = to_fetch.into_iter().collect();
        targets.extend(store.get_many(&step.target, &ids)?);
    }
    if targets.is_empty() {
        return Ok(HashMap::new());
    }

    let shaped = shape(store, &step.plan, &targets)?;
    Ok(shaped.into_iter().map(|p| (p.id, p)).collect())
}

fn limited<'d>(step: &TraversalStep, entries: &'d [RelationEntry]) -> &'d [RelationEntry] {
    match step.limit {
        Some(limit) if entries.len() > limit => &entries[..limit],
        _ => entries,
    }
}

fn snapshot_covers(plan: &FetchPlan, entry: &RelationEntry) -> bool {
    plan.fields
        .iter()
        .all(|f| f == ID_FIELD || entry.snapshot.contains_key(f))
}

fn from_snapshot(plan: &FetchPlan, entry: &RelationEntry) -> Option<ProjectedDocument> {
    if !plan.steps.is_empty() || !snapshot_covers(plan, entry) {
        return None;
    }
    let fields = plan
        .fields
        .iter()
        .filter_map(|f| entry.field(f).map(|v| (f.clone(), v)))
        .collect();
    Some(ProjectedDocument {
        id: entry.id,
        fields,
        relations: BTreeMap::new(),
    })
}

fn scalars(plan: &FetchPlan, doc: &Document) -> ProjectedDocument {
    let fields = plan
        .fields
        .iter()
        .filter_map(|f| doc.get(f).map(|v| (f.clone(), v)))
        .collect();
    ProjectedDocument {
        id: doc.id,
        fields,
        relations: BTreeMap::new(),
    }
}
