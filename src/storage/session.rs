// src/storage/session.rs

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::types::StorageKind;

use super::{StorageBackend, StoredEntry};

/// `(namespace, key)`. Kept as a pair so no namespace can shadow another.
type ScopedKey = (String, String);

/// Process-wide string store of serialized JSON entries.
static SESSION_STORE: LazyLock<Mutex<HashMap<ScopedKey, String>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Session-scoped storage.
///
/// Every `SessionStorage` with the same namespace sees the same entries, for
/// as long as the process lives. `clear` only touches this namespace.
#[derive(Debug)]
pub struct SessionStorage {
    namespace: String,
    clock: Arc<dyn Clock>,
}

impl SessionStorage {
    pub fn new(namespace: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            namespace: namespace.into(),
            clock,
        }
    }

    fn scoped(&self, key: &str) -> ScopedKey {
        (self.namespace.clone(), key.to_string())
    }
}

impl StorageBackend for SessionStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Session
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        let scoped = self.scoped(key);
        let mut store = SESSION_STORE.lock();

        let Some(raw) = store.get(&scoped) else {
            return Ok(None);
        };

        let entry: StoredEntry = match serde_json::from_str(raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(namespace = %self.namespace, key, error = %e, "dropping undecodable session entry");
                store.remove(&scoped);
                return Ok(None);
            }
        };

        if entry.is_expired(self.clock.now_millis()) {
            store.remove(&scoped);
            debug!(namespace = %self.namespace, key, "evicted expired entry (session)");
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let entry = StoredEntry::new(value, self.clock.now_millis(), ttl);
        let raw = serde_json::to_string(&entry)
            .with_context(|| format!("encoding session entry for {key}"))?;
        SESSION_STORE.lock().insert(self.scoped(key), raw);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        SESSION_STORE.lock().remove(&self.scoped(key));
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        SESSION_STORE
            .lock()
            .retain(|(namespace, _), _| *namespace != self.namespace);
        Ok(())
    }
}
