//! Staged multi-document writes.

use std::collections::{BTreeSet, HashMap};

use docrel_proto::{DocId, Document, FilterExpr, Pagination};

use super::{Batch, DocKey, DocumentStore};
use crate::error::Error;
use crate::query::FilterEvaluator;

/// Collects the reads and writes of one logical operation.
///
/// Reads go through a local cache so later steps see earlier writes.
/// Nothing reaches the store until [`Transaction::into_batch`] is applied.
/// Every key read or written is recorded in the touched set, which the lock
/// table uses to decide whether the operation ran under enough locks.
pub struct Transaction<'a> {
    store: &'a dyn DocumentStore,
    /// Latest known state per key; `None` means absent or deleted.
    cache: HashMap<DocKey, Option<Document>>,
    /// Keys with pending writes.
    writes: BTreeSet<DocKey>,
    /// Keys read or written.
    touched: BTreeSet<DocKey>,
}

impl<'a> Transaction<'a> {
    /// Create a new transaction over a store.
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self {
            store,
            cache: HashMap::new(),
            writes: BTreeSet::new(),
            touched: BTreeSet::new(),
        }
    }

    /// Read a document, seeing this transaction's own writes.
    pub fn get(&mut self, collection: &str, id: DocId) -> Result<Option<Document>, Error> {
        let key = DocKey::new(collection, id);
        self.touched.insert(key.clone());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }
        let loaded = self.store.get(collection, &id)?;
        self.cache.insert(key, loaded.clone());
        Ok(loaded)
    }

    /// Read a document that must exist.
    pub fn require(&mut self, collection: &str, id: DocId) -> Result<Document, Error> {
        self.get(collection, id)?.ok_or_else(|| Error::NotFound {
            entity: collection.to_string(),
            id,
        })
    }

    /// Queue a put.
    pub fn put(&mut self, collection: &str, document: Document) -> &mut Self {
        let key = DocKey::new(collection, document.id);
        self.touched.insert(key.clone());
        self.writes.insert(key.clone());
        self.cache.insert(key, Some(document));
        self
    }

    /// Queue a delete.
    pub fn delete(&mut self, collection: &str, id: DocId) -> &mut Self {
        let key = DocKey::new(collection, id);
        self.touched.insert(key.clone());
        self.writes.insert(key.clone());
        self.cache.insert(key, None);
        self
    }

    /// Identifiers of documents matching a filter, identifier ascending.
    ///
    /// Combines committed matches with this transaction's pending state, so
    /// documents written earlier in the transaction are judged as written.
    pub fn find_ids(&mut self, collection: &str, filter: &FilterExpr) -> Result<Vec<DocId>, Error> {
        let mut candidates: BTreeSet<DocId> = self
            .store
            .find(collection, Some(filter), &[], Pagination::default())?
            .into_iter()
            .map(|doc| doc.id)
            .collect();
        candidates.extend(
            self.cache
                .keys()
                .filter(|key| key.collection == collection)
                .map(|key| key.id),
        );

        let mut ids = Vec::with_capacity(candidates.len());
        for id in candidates {
            if let Some(doc) = self.get(collection, id)? {
                if FilterEvaluator::evaluate(filter, &doc) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Keys read or written so far.
    pub fn touched(&self) -> &BTreeSet<DocKey> {
        &self.touched
    }

    /// Number of pending writes.
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Turn the pending writes into a store batch, in key order.
    pub fn into_batch(mut self) -> Batch {
        let mut batch = Batch::new();
        for key in std::mem::take(&mut self.writes) {
            match self.cache.remove(&key).flatten() {
                Some(document) => batch.put(key.collection, document),
                None => batch.delete(key.collection, key.id),
            };
        }
        batch
    }
}
