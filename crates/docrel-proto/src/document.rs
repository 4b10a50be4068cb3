//! Stored documents and their relation entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{DocId, Value};

/// Name of the identifier field, addressable in filters, sorts and projections.
pub const ID_FIELD: &str = "_id";

/// A reference to a related document.
///
/// The snapshot carries the related document's scalar fields as they were at
/// the last write touching either side, so filters and sorts on related data
/// do not need a second fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEntry {
    /// Identifier of the related document.
    pub id: DocId,
    /// Denormalized scalar fields of the related document.
    #[serde(default)]
    pub snapshot: BTreeMap<String, Value>,
    /// Full related document, attached by a pipeline lookup stage.
    #[serde(skip)]
    pub joined: Option<Box<Document>>,
}

impl RelationEntry {
    /// Create an entry with an empty snapshot.
    pub fn new(id: DocId) -> Self {
        Self {
            id,
            snapshot: BTreeMap::new(),
            joined: None,
        }
    }

    /// Create an entry carrying the given snapshot.
    pub fn with_snapshot(id: DocId, snapshot: BTreeMap<String, Value>) -> Self {
        Self {
            id,
            snapshot,
            joined: None,
        }
    }

    /// Read a field of the related document. `_id` resolves to the entry id.
    pub fn field(&self, name: &str) -> Option<Value> {
        if name == ID_FIELD {
            return Some(Value::Id(self.id));
        }
        self.snapshot.get(name).cloned()
    }
}

/// An instance of an entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier.
    #[serde(rename = "_id")]
    pub id: DocId,
    /// Scalar field values.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Relation name to ordered entries.
    #[serde(default)]
    pub relations: BTreeMap<String, Vec<RelationEntry>>,
}

impl Document {
    /// Create an empty document with the given identifier.
    pub fn new(id: DocId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    /// Set a scalar field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Read a scalar field. `_id` resolves to the document id.
    pub fn get(&self, name: &str) -> Option<Value> {
        if name == ID_FIELD {
            return Some(Value::Id(self.id));
        }
        self.fields.get(name).cloned()
    }

    /// Entries of a relation, empty when the relation has never been set.
    pub fn relation(&self, name: &str) -> &[RelationEntry] {
        self.relations.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Identifiers referenced by a relation, in stored order.
    pub fn relation_ids(&self, name: &str) -> Vec<DocId> {
        self.relation(name).iter().map(|e| e.id).collect()
    }

    /// Whether a relation references the given document.
    pub fn references(&self, relation: &str, id: &DocId) -> bool {
        self.relation(relation).iter().any(|e| &e.id == id)
    }

    /// Mutable entries of a relation, created on first use.
    pub fn relation_mut(&mut self, name: &str) -> &mut Vec<RelationEntry> {
        self.relations.entry(name.to_string()).or_default()
    }

    /// Drop every entry pointing at `id` from a relation. Returns whether any was removed.
    pub fn remove_reference(&mut self, relation: &str, id: &DocId) -> bool {
        match self.relations.get_mut(relation) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|e| &e.id != id);
                entries.len() != before
            }
            None => false,
        }
    }

    /// Scalar fields copied into relation entries that point at this document.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.fields.clone()
    }

    /// Resolve a possibly dotted path to every value it reaches.
    ///
    /// A plain name reads a scalar field, or the ids of a relation. A dotted
    /// path `relation.rest` descends into each entry of the relation: a joined
    /// document is followed recursively, otherwise the snapshot answers a
    /// single remaining segment. Multiple relations yield one value per entry.
    pub fn resolve_path(&self, path: &str) -> Vec<Value> {
        match path.split_once('.') {
            None => {
                if let Some(value) = self.get(path) {
                    return vec![value];
                }
                self.relation(path).iter().map(|e| Value::Id(e.id)).collect()
            }
            Some((relation, rest)) => {
                let mut out = Vec::new();
                for entry in self.relation(relation) {
                    match &entry.joined {
                        Some(doc) => out.extend(doc.resolve_path(rest)),
                        None => {
                            if !rest.contains('.') {
                                if let Some(value) = entry.field(rest) {
                                    out.push(value);
                                }
                            }
                        }
                    }
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city(name: &str, population: i64) -> Document {
        Document::new(DocId::generate())
            .with_field("name", name)
            .with_field("population", population)
    }

    #[test]
    fn test_get_id_and_fields() {
        let doc = city("Paris", 2_100_000);
        assert_eq!(doc.get("_id"), Some(Value::Id(doc.id)));
        assert_eq!(doc.get("name"), Some(Value::String("Paris".into())));
        assert_eq!(doc.get("missing"), None);
    }

    #[test]
    fn test_relation_references() {
        let target = city("Lyon", 500_000);
        let mut doc = Document::new(DocId::generate());
        doc.relation_mut("cities")
            .push(RelationEntry::with_snapshot(target.id, target.snapshot()));

        assert!(doc.references("cities", &target.id));
        assert_eq!(doc.relation_ids("cities"), vec![target.id]);
        assert!(doc.remove_reference("cities", &target.id));
        assert!(!doc.remove_reference("cities", &target.id));
        assert!(doc.relation("cities").is_empty());
    }

    #[test]
    fn test_resolve_dotted_snapshot_path() {
        let a = city("A", 10);
        let b = city("B", 20);
        let mut country = Document::new(DocId::generate());
        country
            .relation_mut("cities")
            .push(RelationEntry::with_snapshot(a.id, a.snapshot()));
        country
            .relation_mut("cities")
            .push(RelationEntry::with_snapshot(b.id, b.snapshot()));

        assert_eq!(
            country.resolve_path("cities.population"),
            vec![Value::Int64(10), Value::Int64(20)]
        );
        assert_eq!(
            country.resolve_path("cities._id"),
            vec![Value::Id(a.id), Value::Id(b.id)]
        );
        assert_eq!(
            country.resolve_path("cities"),
            vec![Value::Id(a.id), Value::Id(b.id)]
        );
        // Two hops need a joined document.
        assert!(country.resolve_path("cities.country.name").is_empty());
    }

    #[test]
    fn test_resolve_through_joined_document() {
        let mut capital = city("Rome", 2_800_000);
        let country = Document::new(DocId::generate()).with_field("name", "Italy");
        capital
            .relation_mut("country")
            .push(RelationEntry::with_snapshot(country.id, country.snapshot()));

        let mut entry = RelationEntry::new(capital.id);
        entry.joined = Some(Box::new(capital));
        let mut user = Document::new(DocId::generate());
        user.relation_mut("mostLovedCity").push(entry);

        assert_eq!(
            user.resolve_path("mostLovedCity.country.name"),
            vec![Value::String("Italy".into())]
        );
    }

    #[test]
    fn test_joined_is_not_serialized() {
        let target = city("X", 1);
        let mut entry = RelationEntry::with_snapshot(target.id, target.snapshot());
        entry.joined = Some(Box::new(target));

        let json = serde_json::to_string(&entry).unwrap();
        let back: RelationEntry = serde_json::from_str(&json).unwrap();
        assert!(back.joined.is_none());
    }
}
