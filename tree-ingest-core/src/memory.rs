//! In-memory [`Store`] for tests and dry runs.
//!
//! Records live in a `HashMap` keyed by id. Write calls are counted so tests can
//! assert that an idempotent run wrote nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::contract::{ItemId, Record, RecordUpdate, Store, Tree};
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<ItemId, Record>>,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the write counters.
    pub fn with_record(self, record: Record) -> Self {
        if let Ok(mut records) = self.records.lock() {
            records.insert(record.id, record);
        }
        self
    }

    pub fn get(&self, id: ItemId) -> Option<Record> {
        self.records.lock().ok()?.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make the store usable again after a run closed it.
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<ItemId, Record>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Other("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_by_key(&self, id: ItemId) -> Result<Option<Record>, StoreError> {
        self.ensure_open()?;
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn insert_record(&self, tree: &Tree) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut records = self.lock()?;
        if records.contains_key(&tree.id()) {
            return Err(StoreError::Other(format!(
                "record {} already exists",
                tree.id()
            )));
        }
        records.insert(tree.id(), Record::from_tree(tree));
        self.inserts.fetch_add(1, Ordering::SeqCst);
        debug!(id = %tree.id(), "[MEMORY] Inserted record");
        Ok(())
    }

    async fn update_partial(&self, id: ItemId, update: RecordUpdate) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut records = self.lock()?;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        record.apply(update);
        self.updates.fetch_add(1, Ordering::SeqCst);
        debug!(id = %id, "[MEMORY] Updated record");
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
