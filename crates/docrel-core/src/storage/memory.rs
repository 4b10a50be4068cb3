//! In-memory document store.

use std::collections::{BTreeMap, HashMap};

use docrel_proto::{DocId, Document};
use parking_lot::RwLock;

use super::{Batch, BatchOp, DocumentStore};
use crate::error::Error;

/// Arena of documents per collection, indexed by identifier.
///
/// A batch is applied under one write lock, so readers see all of it or none.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<DocId, Document>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Check if a collection is empty.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: &str, id: &DocId) -> Result<Option<Document>, Error> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn get_many(&self, collection: &str, ids: &[DocId]) -> Result<Vec<Document>, Error> {
        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| docs.get(id).cloned()).collect())
    }

    fn scan(&self, collection: &str) -> Result<Vec<Document>, Error> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    fn apply(&self, batch: Batch) -> Result<(), Error> {
        let mut collections = self.collections.write();
        for op in batch {
            match op {
                BatchOp::Put {
                    collection,
                    document,
                } => {
                    collections
                        .entry(collection)
                        .or_default()
                        .insert(document.id, document);
                }
                BatchOp::Delete { collection, id } => {
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}
