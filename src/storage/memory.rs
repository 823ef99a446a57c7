// src/storage/memory.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::clock::Clock;
use crate::types::StorageKind;

use super::{StorageBackend, StoredEntry};

/// Stores entries in memory only.
#[derive(Debug)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, StoredEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStorage {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Memory
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            entries.remove(key);
            debug!(key, "evicted expired entry (memory)");
            return Ok(None);
        }

        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let entry = StoredEntry::new(value, self.clock.now_millis(), ttl);
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}
