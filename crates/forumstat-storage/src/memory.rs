//! In-memory storage backend

use async_trait::async_trait;
use forumstat_core::error::Result;
use forumstat_core::storage::Storage;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Storage kept in a `BTreeMap` for the lifetime of the process.
///
/// Counts every successful write, which tests use to assert that an
/// operation did not touch storage at all.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Value>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing contents
    pub fn with_entries(entries: BTreeMap<String, Value>) -> Self {
        Self {
            entries: RwLock::new(entries),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `set_raw` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_raw(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn snapshot(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self.entries.read().await.clone())
    }
}
