//! Document storage.
//!
//! The engine talks to storage through the [`DocumentStore`] trait: reads by
//! identifier, collection scans, filtered finds, pipeline execution and
//! atomic batch application. Collections are named after entity types.

mod config;
mod lock;
mod memory;
mod sled_store;
mod transaction;

pub use config::StorageConfig;
pub use lock::{LockSet, LockTable};
pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use transaction::Transaction;

use docrel_proto::{DocId, Document, FilterExpr, OrderSpec, Pagination};

use crate::error::Error;
use crate::query::{run_pipeline, sort_documents, FilterEvaluator, PipelineOp};

/// Address of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocKey {
    /// Collection (entity type) name.
    pub collection: String,
    /// Document identifier.
    pub id: DocId,
}

impl DocKey {
    /// Create a key.
    pub fn new(collection: impl Into<String>, id: DocId) -> Self {
        Self {
            collection: collection.into(),
            id,
        }
    }
}

/// A single write in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Insert or overwrite a document.
    Put {
        /// Collection name.
        collection: String,
        /// Document to store.
        document: Document,
    },
    /// Remove a document.
    Delete {
        /// Collection name.
        collection: String,
        /// Document identifier.
        id: DocId,
    },
}

impl BatchOp {
    /// Key written by this operation.
    pub fn key(&self) -> DocKey {
        match self {
            BatchOp::Put {
                collection,
                document,
            } => DocKey::new(collection.clone(), document.id),
            BatchOp::Delete { collection, id } => DocKey::new(collection.clone(), *id),
        }
    }
}

/// Writes applied atomically by [`DocumentStore::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put.
    pub fn put(&mut self, collection: impl Into<String>, document: Document) -> &mut Self {
        self.ops.push(BatchOp::Put {
            collection: collection.into(),
            document,
        });
        self
    }

    /// Queue a delete.
    pub fn delete(&mut self, collection: impl Into<String>, id: DocId) -> &mut Self {
        self.ops.push(BatchOp::Delete {
            collection: collection.into(),
            id,
        });
        self
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Queued operations in order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

impl IntoIterator for Batch {
    type Item = BatchOp;
    type IntoIter = std::vec::IntoIter<BatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// Storage driver consumed by the engine.
///
/// Implementations must make [`DocumentStore::apply`] all-or-nothing.
/// `find` and `aggregate` have scan-based defaults that drivers with native
/// query support can override.
pub trait DocumentStore: Send + Sync {
    /// Read one document.
    fn get(&self, collection: &str, id: &DocId) -> Result<Option<Document>, Error>;

    /// Read several documents, skipping missing ones, in the order asked.
    fn get_many(&self, collection: &str, ids: &[DocId]) -> Result<Vec<Document>, Error> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.get(collection, id)? {
                out.push(doc);
            }
        }
        Ok(out)
    }

    /// Every document of a collection, identifier ascending.
    fn scan(&self, collection: &str) -> Result<Vec<Document>, Error>;

    /// Filtered, ordered, paginated read.
    fn find(
        &self,
        collection: &str,
        filter: Option<&FilterExpr>,
        order: &[OrderSpec],
        page: Pagination,
    ) -> Result<Vec<Document>, Error> {
        let mut docs = self.scan(collection)?;
        if let Some(filter) = filter {
            docs.retain(|doc| FilterEvaluator::evaluate(filter, doc));
        }
        sort_documents(&mut docs, order);
        Ok(page.apply(docs))
    }

    /// Run a lowered aggregation pipeline over a collection.
    fn aggregate(&self, collection: &str, ops: &[PipelineOp]) -> Result<Vec<Document>, Error> {
        run_pipeline(self, collection, ops)
    }

    /// Apply every operation of the batch, or none.
    fn apply(&self, batch: Batch) -> Result<(), Error>;
}
