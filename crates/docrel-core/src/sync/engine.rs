//! Relation synchronization engine.
//!
//! Every forward entry written here is mirrored onto the inverses of its
//! relation on the referenced document, and every removal is mirrored the
//! same way. All reads and writes go through the caller's [`Transaction`],
//! so an operation either lands completely or not at all.

use std::collections::{BTreeMap, BTreeSet};

use docrel_proto::{DocId, Document, FilterExpr, RelationEntry, Value, ID_FIELD};
use tracing::{debug, trace};

use super::window;
use crate::catalog::{Cardinality, EntityDef, RelationDef, RelationGraph};
use crate::error::Error;
use crate::query::validate_filter;
use crate::storage::Transaction;

/// References to write into one forward relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRef {
    /// Forward relation name.
    pub relation: String,
    /// Referenced document identifiers.
    pub targets: Vec<DocId>,
    /// Per-inverse switches; inverses not named follow their declaration.
    pub related: BTreeMap<String, bool>,
}

impl RelationRef {
    /// Reference several documents.
    pub fn new(relation: impl Into<String>, targets: impl IntoIterator<Item = DocId>) -> Self {
        Self {
            relation: relation.into(),
            targets: targets.into_iter().collect(),
            related: BTreeMap::new(),
        }
    }

    /// Reference one document.
    pub fn to(relation: impl Into<String>, target: DocId) -> Self {
        Self::new(relation, [target])
    }

    /// Switch an inverse on or off for this write.
    pub fn with_related(mut self, inverse: impl Into<String>, enabled: bool) -> Self {
        self.related.insert(inverse.into(), enabled);
        self
    }
}

/// A validated relation reference.
struct Resolved<'g> {
    def: &'g RelationDef,
    targets: Vec<DocId>,
    inverses: Vec<&'g RelationDef>,
    /// Inverses the caller switched explicitly, applied to existing edges too.
    toggled: Vec<(&'g RelationDef, bool)>,
}

/// A document that lost its reference to a removed document.
#[derive(Debug, Clone)]
pub(crate) struct Referrer<'g> {
    /// Forward relation that held the reference.
    pub relation: &'g RelationDef,
    /// Referring document.
    pub id: DocId,
    /// Whether a required relation was left empty.
    pub orphaned: bool,
}

/// Outcome of detaching a document from every edge.
#[derive(Debug, Default)]
pub(crate) struct Detachment<'g> {
    /// Entries removed from other documents.
    pub edges: usize,
    /// Documents whose forward relations pointed at the detached one.
    pub referrers: Vec<Referrer<'g>>,
}

/// Keeps forward relations and their inverses in step.
pub struct RelationSyncEngine<'g> {
    graph: &'g RelationGraph,
}

impl<'g> RelationSyncEngine<'g> {
    /// Create an engine over a relation graph.
    pub fn new(graph: &'g RelationGraph) -> Self {
        Self { graph }
    }

    /// Insert a document under a caller-chosen identifier, with its relations.
    ///
    /// Fields and references are validated before anything is read. Each
    /// referenced document must exist and gains inverse entries for the
    /// inverses switched on.
    pub fn insert(
        &self,
        tx: &mut Transaction<'_>,
        entity: &str,
        id: DocId,
        fields: BTreeMap<String, Value>,
        refs: &[RelationRef],
    ) -> Result<Document, Error> {
        let def = self.graph.entity(entity)?;
        let fields = self.check_fields(def, fields, true)?;

        let mut resolved: Vec<Resolved<'g>> = Vec::with_capacity(refs.len());
        for rref in refs {
            if resolved.iter().any(|r| r.def.name == rref.relation) {
                return Err(Error::InvalidRequest(format!(
                    "relation {entity}.{} given twice",
                    rref.relation
                )));
            }
            resolved.push(self.resolve(entity, rref)?);
        }
        for relation in def.forward_relations().filter(|r| !r.optional) {
            let given = resolved
                .iter()
                .any(|r| r.def.name == relation.name && !r.targets.is_empty());
            if !given {
                return Err(Error::MissingRequiredRelation {
                    entity: entity.to_string(),
                    relation: relation.name.clone(),
                });
            }
        }

        if tx.get(entity, id)?.is_some() {
            return Err(Error::InvalidRequest(format!("{entity} {id} already exists")));
        }
        let mut doc = Document {
            id,
            fields,
            relations: BTreeMap::new(),
        };
        for r in &resolved {
            for target in &r.targets {
                self.link(tx, r, &mut doc, *target)?;
            }
        }
        debug!(entity, %id, relations = resolved.len(), "inserted");
        tx.put(entity, doc.clone());
        Ok(doc)
    }

    /// Add references to every document matching a filter.
    ///
    /// With `replace`, references not in `rref.targets` are removed first.
    /// Without it, a single relation that already points elsewhere is a
    /// [`Error::CardinalityViolation`]. Existing references keep their place;
    /// inverses switched explicitly in `rref.related` are added to or dropped
    /// from the referenced document.
    pub fn add_relation(
        &self,
        tx: &mut Transaction<'_>,
        entity: &str,
        filter: &FilterExpr,
        rref: &RelationRef,
        replace: bool,
    ) -> Result<Vec<Document>, Error> {
        let resolved = self.resolve(entity, rref)?;
        let def = resolved.def;
        validate_filter(self.graph, entity, filter, &BTreeSet::new())?;

        let mut updated = Vec::new();
        for id in tx.find_ids(entity, filter)? {
            let mut doc = tx.require(entity, id)?;
            if replace {
                let stale: Vec<DocId> = doc
                    .relation_ids(&def.name)
                    .into_iter()
                    .filter(|t| !resolved.targets.contains(t))
                    .collect();
                for target in stale {
                    self.unlink(tx, def, &mut doc, target)?;
                }
            } else if def.cardinality == Cardinality::Single {
                let occupied = doc
                    .relation(&def.name)
                    .iter()
                    .any(|e| !resolved.targets.contains(&e.id));
                if occupied {
                    return Err(Error::cardinality(
                        entity,
                        &def.name,
                        "single relation is already set; use replace",
                    ));
                }
            }

            for target in &resolved.targets {
                self.link(tx, &resolved, &mut doc, *target)?;
            }
            if !def.optional && doc.relation(&def.name).is_empty() {
                return Err(Error::MissingRequiredRelation {
                    entity: entity.to_string(),
                    relation: def.name.clone(),
                });
            }
            tx.put(entity, doc.clone());
            updated.push(doc);
        }
        debug!(entity, relation = %def.name, documents = updated.len(), replace, "added relation");
        Ok(updated)
    }

    /// Remove references from every document matching a filter.
    ///
    /// References that are not present are ignored.
    pub fn remove_relation(
        &self,
        tx: &mut Transaction<'_>,
        entity: &str,
        filter: &FilterExpr,
        relation: &str,
        targets: &[DocId],
    ) -> Result<Vec<Document>, Error> {
        let def = self.graph.forward_relation(entity, relation)?;
        validate_filter(self.graph, entity, filter, &BTreeSet::new())?;

        let mut updated = Vec::new();
        for id in tx.find_ids(entity, filter)? {
            let mut doc = tx.require(entity, id)?;
            let mut removed = 0;
            for target in targets {
                if self.unlink(tx, def, &mut doc, *target)? {
                    removed += 1;
                }
            }
            if removed > 0 {
                if !def.optional && doc.relation(&def.name).is_empty() {
                    return Err(Error::MissingRequiredRelation {
                        entity: entity.to_string(),
                        relation: def.name.clone(),
                    });
                }
                tx.put(entity, doc.clone());
            }
            updated.push(doc);
        }
        debug!(entity, relation, documents = updated.len(), "removed relation");
        Ok(updated)
    }

    /// Set scalar fields on every document matching a filter.
    ///
    /// Snapshots of the updated documents are refreshed wherever they are
    /// stored, and affected relations are put back in rank order.
    pub fn update(
        &self,
        tx: &mut Transaction<'_>,
        entity: &str,
        filter: &FilterExpr,
        set: &BTreeMap<String, Value>,
    ) -> Result<Vec<Document>, Error> {
        let def = self.graph.entity(entity)?;
        let set = self.check_fields(def, set.clone(), false)?;
        validate_filter(self.graph, entity, filter, &BTreeSet::new())?;
        let changed: BTreeSet<String> = set.keys().cloned().collect();

        let mut updated = Vec::new();
        for id in tx.find_ids(entity, filter)? {
            let mut doc = tx.require(entity, id)?;
            for (name, value) in &set {
                doc.fields.insert(name.clone(), value.clone());
            }
            tx.put(entity, doc.clone());
            self.refresh_snapshots(tx, def, &doc, &changed)?;
            updated.push(doc);
        }
        debug!(entity, documents = updated.len(), fields = changed.len(), "updated");
        Ok(updated)
    }

    /// Remove every edge touching a document, leaving the document itself.
    ///
    /// Covers its own forward entries, the forward entries of documents
    /// listed in its inverses, and forward referrers found by scanning each
    /// relation that targets its entity, since bounded inverses may not list
    /// every referrer.
    pub(crate) fn detach(
        &self,
        tx: &mut Transaction<'_>,
        entity: &str,
        doc: &Document,
    ) -> Result<Detachment<'g>, Error> {
        let mut outcome = Detachment::default();

        for relation in self.graph.relations_from(entity) {
            if !relation.is_forward() {
                continue;
            }
            for target in doc.relation_ids(&relation.name) {
                if self.unmirror(tx, relation, doc.id, target)? {
                    outcome.edges += 1;
                }
            }
        }

        for relation in self.graph.relations_to(entity) {
            let path = format!("{}.{ID_FIELD}", relation.name);
            let ids = tx.find_ids(&relation.from_entity, &FilterExpr::eq(path, doc.id))?;
            for id in ids {
                let Some(mut referrer) = tx.get(&relation.from_entity, id)? else {
                    continue;
                };
                if !referrer.remove_reference(&relation.name, &doc.id) {
                    continue;
                }
                let orphaned = !relation.optional && referrer.relation(&relation.name).is_empty();
                tx.put(&relation.from_entity, referrer);
                outcome.edges += 1;
                outcome.referrers.push(Referrer {
                    relation,
                    id,
                    orphaned,
                });
            }
        }

        trace!(entity, id = %doc.id, edges = outcome.edges, "detached");
        Ok(outcome)
    }

    /// Validate a reference and pick the inverses it updates.
    fn resolve(&self, entity: &str, rref: &RelationRef) -> Result<Resolved<'g>, Error> {
        let def = self.graph.forward_relation(entity, &rref.relation)?;

        let mut targets: Vec<DocId> = Vec::with_capacity(rref.targets.len());
        for target in &rref.targets {
            if !targets.contains(target) {
                targets.push(*target);
            }
        }
        if def.cardinality == Cardinality::Single && targets.len() > 1 {
            return Err(Error::cardinality(
                entity,
                &def.name,
                format!("single relation given {} references", targets.len()),
            ));
        }

        let declared = self.graph.inverses_of(def);
        if let Some(unknown) = rref
            .related
            .keys()
            .find(|name| !declared.iter().any(|i| &i.name == *name))
        {
            return Err(Error::unknown_relation(&def.to_entity, unknown));
        }

        let mut inverses = Vec::with_capacity(declared.len());
        let mut toggled = Vec::new();
        for inverse in declared {
            let explicit = rref.related.get(&inverse.name).copied();
            if let Some(enabled) = explicit {
                toggled.push((inverse, enabled));
            }
            let enabled = explicit.unwrap_or(inverse.tracked_by_default);
            if !enabled && inverse.is_unbounded() {
                return Err(Error::InvalidRequest(format!(
                    "{}.{} lists every referrer and cannot be skipped",
                    def.to_entity, inverse.name
                )));
            }
            if enabled {
                inverses.push(inverse);
            }
        }

        Ok(Resolved {
            def,
            targets,
            inverses,
            toggled,
        })
    }

    /// Check scalar fields against the entity, coercing values.
    ///
    /// On insert, required fields must be present.
    fn check_fields(
        &self,
        def: &EntityDef,
        fields: BTreeMap<String, Value>,
        insert: bool,
    ) -> Result<BTreeMap<String, Value>, Error> {
        let mut out = BTreeMap::new();
        for (name, value) in fields {
            if name == ID_FIELD {
                return Err(Error::InvalidRequest(format!(
                    "{ID_FIELD} is assigned by the engine"
                )));
            }
            let Some(field) = def.get_field(&name) else {
                return Err(Error::unknown_field(&def.name, &name));
            };
            let value = field.accept(value).map_err(|reason| Error::InvalidValue {
                entity: def.name.clone(),
                field: name.clone(),
                reason,
            })?;
            out.insert(name, value);
        }
        if insert {
            if let Some(missing) = def
                .fields
                .iter()
                .find(|f| f.required && !out.contains_key(&f.name))
            {
                return Err(Error::InvalidValue {
                    entity: def.name.clone(),
                    field: missing.name.clone(),
                    reason: "required field is missing".into(),
                });
            }
        }
        Ok(out)
    }

    /// Add a forward entry on `source` and mirror it onto the target.
    ///
    /// The caller writes `source` back. Targets pushed out of a bounded
    /// forward relation lose their inverse entries.
    fn link(
        &self,
        tx: &mut Transaction<'_>,
        resolved: &Resolved<'g>,
        source: &mut Document,
        target_id: DocId,
    ) -> Result<(), Error> {
        let def = resolved.def;
        let inverses = &resolved.inverses;
        if target_id == source.id && def.to_entity == def.from_entity {
            return Err(Error::InvalidRequest(format!(
                "{}.{} cannot reference the document itself",
                def.from_entity, def.name
            )));
        }
        let Some(mut target) = tx.get(&def.to_entity, target_id)? else {
            return Err(Error::DanglingReference {
                entity: def.to_entity.clone(),
                id: target_id,
            });
        };
        if source.references(&def.name, &target_id) {
            return self.retoggle(tx, resolved, source, target);
        }

        let entry = RelationEntry::with_snapshot(target_id, target.snapshot());
        let evicted = window::place(def, source.relation_mut(&def.name), entry)?;
        let mut kept = true;
        for gone in evicted {
            if gone.id == target_id {
                kept = false;
            } else {
                self.unmirror(tx, def, source.id, gone.id)?;
            }
        }
        if !kept || inverses.is_empty() {
            return Ok(());
        }

        let snapshot = source.snapshot();
        for inverse in inverses {
            let entry = RelationEntry::with_snapshot(source.id, snapshot.clone());
            let evicted = window::place(inverse, target.relation_mut(&inverse.name), entry)?;
            if !evicted.is_empty() {
                trace!(relation = %inverse.name, evicted = evicted.len(), "window evicted");
            }
        }
        tx.put(&def.to_entity, target);
        Ok(())
    }

    /// Apply explicit inverse switches to an edge that already exists.
    fn retoggle(
        &self,
        tx: &mut Transaction<'_>,
        resolved: &Resolved<'g>,
        source: &Document,
        mut target: Document,
    ) -> Result<(), Error> {
        let mut touched = false;
        for (inverse, enabled) in &resolved.toggled {
            let present = target.references(&inverse.name, &source.id);
            if *enabled && !present {
                let entry = RelationEntry::with_snapshot(source.id, source.snapshot());
                window::place(inverse, target.relation_mut(&inverse.name), entry)?;
                touched = true;
            } else if !*enabled && present {
                target.remove_reference(&inverse.name, &source.id);
                touched = true;
            }
        }
        if touched {
            trace!(relation = %resolved.def.name, id = %source.id, "inverse switches applied");
            tx.put(&resolved.def.to_entity, target);
        }
        Ok(())
    }

    /// Remove a forward entry from `source` and from the target's inverses.
    ///
    /// Returns whether the entry existed. The caller writes `source` back.
    fn unlink(
        &self,
        tx: &mut Transaction<'_>,
        def: &RelationDef,
        source: &mut Document,
        target_id: DocId,
    ) -> Result<bool, Error> {
        if !source.remove_reference(&def.name, &target_id) {
            return Ok(false);
        }
        self.unmirror(tx, def, source.id, target_id)?;
        Ok(true)
    }

    /// Drop `source_id` from every inverse of `def` on the target.
    fn unmirror(
        &self,
        tx: &mut Transaction<'_>,
        def: &RelationDef,
        source_id: DocId,
        target_id: DocId,
    ) -> Result<bool, Error> {
        let Some(mut target) = tx.get(&def.to_entity, target_id)? else {
            return Ok(false);
        };
        let mut removed = false;
        for inverse in self.graph.inverses_of(def) {
            removed |= target.remove_reference(&inverse.name, &source_id);
        }
        if removed {
            tx.put(&def.to_entity, target);
        }
        Ok(removed)
    }

    /// Push a document's new snapshot into every entry that carries it.
    ///
    /// A sort-field change can also earn the document a place in a window
    /// tracked by default that does not list it, whether it was evicted or
    /// switched off at write time. Switches govern only the write they come
    /// with.
    fn refresh_snapshots(
        &self,
        tx: &mut Transaction<'_>,
        def: &EntityDef,
        doc: &Document,
        changed: &BTreeSet<String>,
    ) -> Result<(), Error> {
        let snapshot = doc.snapshot();

        // Inverse entries on the documents this one references.
        for relation in def.forward_relations() {
            for target_id in doc.relation_ids(&relation.name) {
                let Some(mut target) = tx.get(&relation.to_entity, target_id)? else {
                    continue;
                };
                let mut touched = false;
                for inverse in self.graph.inverses_of(relation) {
                    let entries = target.relation_mut(&inverse.name);
                    if window::refresh(&inverse.sort, entries, &doc.id, &snapshot) {
                        touched = true;
                    } else if inverse.cardinality == Cardinality::Multiple
                        && inverse.tracked_by_default
                        && changed.contains(&inverse.sort.field)
                    {
                        // The new rank may earn a place in the window.
                        let entry = RelationEntry::with_snapshot(doc.id, snapshot.clone());
                        let evicted = window::place(inverse, entries, entry)?;
                        touched |= !evicted.iter().any(|e| e.id == doc.id);
                    }
                }
                if touched {
                    tx.put(&relation.to_entity, target);
                }
            }
        }

        // Forward entries on every referrer.
        for relation in self.graph.relations_to(&def.name) {
            let path = format!("{}.{ID_FIELD}", relation.name);
            for id in tx.find_ids(&relation.from_entity, &FilterExpr::eq(path, doc.id))? {
                let Some(mut referrer) = tx.get(&relation.from_entity, id)? else {
                    continue;
                };
                let entries = referrer.relation_mut(&relation.name);
                if window::refresh(&relation.sort, entries, &doc.id, &snapshot) {
                    tx.put(&relation.from_entity, referrer);
                }
            }
        }
        Ok(())
    }
}
