//! Durability seam for the queue.
//!
//! The queue writes every mutated record through `put` while it still holds
//! its lock, so the store always sees transitions in order. `load_all` is
//! called once by `SignalQueue::open` to rebuild state after a restart.
//! `remove` drops records the queue has purged for good.

use parking_lot::Mutex;
use std::collections::HashMap;

use sigx_core::{Signal, SignalId};

use crate::error::QueueResult;

pub trait SignalStore: Send + Sync {
    /// Persist the latest version of a signal record.
    fn put(&self, signal: &Signal) -> QueueResult<()>;

    /// Load the latest version of every record.
    fn load_all(&self) -> QueueResult<Vec<Signal>>;

    /// Forget records. Unknown ids are ignored.
    fn remove(&self, ids: &[SignalId]) -> QueueResult<()>;
}

/// In-memory store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySignalStore {
    records: Mutex<HashMap<SignalId, Signal>>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl SignalStore for MemorySignalStore {
    fn put(&self, signal: &Signal) -> QueueResult<()> {
        self.records
            .lock()
            .insert(signal.id.clone(), signal.clone());
        Ok(())
    }

    fn load_all(&self) -> QueueResult<Vec<Signal>> {
        Ok(self.records.lock().values().cloned().collect())
    }

    fn remove(&self, ids: &[SignalId]) -> QueueResult<()> {
        let mut records = self.records.lock();
        for id in ids {
            records.remove(id);
        }
        Ok(())
    }
}
