//! Persistent document store on sled.

use docrel_proto::{DocId, Document};
use sled::{Db, Tree};
use tracing::debug;

use super::{Batch, BatchOp, DocumentStore, StorageConfig};
use crate::error::Error;

/// Tree name for documents.
const DOCUMENTS_TREE: &str = "documents";

/// Separator between collection name and identifier in keys.
const KEY_SEPARATOR: u8 = 0;

/// Document store keeping every collection in one sled tree.
///
/// Keys are `collection \0 id`, values are JSON-encoded documents. Batches go
/// through `Tree::apply_batch`, which sled applies atomically.
pub struct SledStore {
    db: Db,
    documents: Tree,
    flush_on_write: bool,
}

impl SledStore {
    /// Open or create a store with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        let documents = db.open_tree(DOCUMENTS_TREE)?;
        debug!(path = %config.path.display(), temporary = config.temporary, "opened sled store");
        Ok(Self {
            db,
            documents,
            flush_on_write: config.flush_on_write,
        })
    }

    /// Open a temporary store, removed on drop.
    pub fn temporary() -> Result<Self, Error> {
        Self::open(StorageConfig::temporary())
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    /// Get database size in bytes.
    pub fn size_on_disk(&self) -> Result<u64, Error> {
        Ok(self.db.size_on_disk()?)
    }

    fn prefix(collection: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(collection.len() + 1);
        prefix.extend_from_slice(collection.as_bytes());
        prefix.push(KEY_SEPARATOR);
        prefix
    }

    fn key(collection: &str, id: &DocId) -> Vec<u8> {
        let mut key = Self::prefix(collection);
        key.extend_from_slice(id.as_bytes());
        key
    }

    fn decode(bytes: &[u8]) -> Result<Document, Error> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl DocumentStore for SledStore {
    fn get(&self, collection: &str, id: &DocId) -> Result<Option<Document>, Error> {
        match self.documents.get(Self::key(collection, id))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan(&self, collection: &str) -> Result<Vec<Document>, Error> {
        // Identifiers are fixed-width, so key order is identifier order.
        self.documents
            .scan_prefix(Self::prefix(collection))
            .map(|entry| {
                let (_, bytes) = entry?;
                Self::decode(&bytes)
            })
            .collect()
    }

    fn apply(&self, batch: Batch) -> Result<(), Error> {
        let mut sled_batch = sled::Batch::default();
        let count = batch.len();
        for op in batch {
            match op {
                BatchOp::Put {
                    collection,
                    document,
                } => {
                    let bytes = serde_json::to_vec(&document)?;
                    sled_batch.insert(Self::key(&collection, &document.id), bytes);
                }
                BatchOp::Delete { collection, id } => {
                    sled_batch.remove(Self::key(&collection, &id));
                }
            }
        }
        self.documents.apply_batch(sled_batch)?;
        if self.flush_on_write {
            self.db.flush()?;
        }
        debug!(ops = count, flushed = self.flush_on_write, "applied batch");
        Ok(())
    }
}
