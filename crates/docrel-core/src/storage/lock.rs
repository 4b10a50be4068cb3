//! Per-document mutual exclusion for write operations.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use tracing::{debug, warn};

use super::{DocKey, DocumentStore, Transaction};
use crate::error::Error;

/// Table of per-document locks.
///
/// Locks are always taken in key order, so two operations can never wait on
/// each other in a cycle. Entries are dropped once nobody holds or waits on
/// them.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<DocKey, Arc<Mutex<()>>>,
}

/// Locks held for one attempt of an operation. Released on drop.
pub struct LockSet<'t> {
    table: &'t LockTable,
    guards: Vec<(DocKey, ArcMutexGuard<RawMutex, ()>)>,
}

impl LockTable {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every key, in order.
    pub fn lock(&self, keys: &BTreeSet<DocKey>) -> LockSet<'_> {
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            // Clone the mutex out so the map shard is not held while waiting.
            let mutex = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push((key.clone(), mutex.lock_arc()));
        }
        LockSet {
            table: self,
            guards,
        }
    }

    /// Number of live lock entries.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Check if no lock entries are live.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Run a write operation under locks on every document it touches.
    ///
    /// The operation is planned against a fresh transaction while holding the
    /// locks found so far. If planning touched a document outside the locked
    /// set, the set grows and the operation is planned again; after
    /// `attempts` rounds without converging the call fails with
    /// [`Error::LockContention`]. Errors raised while fully locked are
    /// returned as is; nothing is written unless the operation succeeds.
    pub fn execute<T, F>(
        &self,
        store: &dyn DocumentStore,
        attempts: usize,
        mut op: F,
    ) -> Result<T, Error>
    where
        F: FnMut(&mut Transaction<'_>) -> Result<T, Error>,
    {
        let attempts = attempts.max(1);
        let mut locked = BTreeSet::new();

        for attempt in 1..=attempts {
            let _held = self.lock(&locked);
            let mut tx = Transaction::new(store);
            let outcome = op(&mut tx);

            if tx.touched().is_subset(&locked) {
                let value = outcome?;
                let writes = tx.write_count();
                store.apply(tx.into_batch())?;
                debug!(attempt, locks = locked.len(), writes, "committed");
                return Ok(value);
            }

            let missing = tx.touched().difference(&locked).count();
            if attempt == 1 {
                debug!(missing, "acquiring locks for planned documents");
            } else {
                warn!(attempt, missing, "touched documents changed while locked; retrying");
            }
            locked.extend(tx.touched().iter().cloned());
        }

        Err(Error::LockContention { attempts })
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        for (key, guard) in self.guards.drain(..) {
            drop(guard);
            self.table
                .locks
                .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}
