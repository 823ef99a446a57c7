// src/storage/mod.rs

//! Key/value backends with per-entry expiry.
//!
//! All backends share one contract: values are opaque JSON, every entry
//! carries an absolute `expire_at`, and a `get` that finds an expired entry
//! removes it and reports a miss.
//!
//! - [`MemoryStorage`]: a map owned by one cache instance.
//! - [`SessionStorage`]: a process-wide string store, namespaced, that every
//!   service in the process can see. Gone when the process exits.
//! - [`DurableStorage`]: a JSON file on disk (`<dir>/cache.json`).

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::types::StorageKind;

pub mod durable;
pub mod memory;
pub mod session;

pub use durable::{CACHE_FILE_NAME, DurableStorage};
pub use memory::MemoryStorage;
pub use session::SessionStorage;

/// A stored value with its absolute expiry (epoch milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub value: Value,
    pub expire_at: u64,
}

impl StoredEntry {
    pub fn new(value: Value, now: u64, ttl: Duration) -> Self {
        Self {
            value,
            expire_at: now.saturating_add(ttl.as_millis() as u64),
        }
    }

    /// An entry is valid up to and including `expire_at`.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expire_at
    }
}

/// Abstract key/value storage with expiry.
pub trait StorageBackend: Send + Sync + Debug {
    fn kind(&self) -> StorageKind;
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Settings shared by backends that need more than a clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOptions {
    /// Directory for [`DurableStorage`].
    pub dir: PathBuf,
    /// Partition of the process-wide store used by [`SessionStorage`].
    pub namespace: String,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".fetchq"),
            namespace: "fetchq".to_string(),
        }
    }
}

/// Build the backend for `kind`.
pub fn open_backend(
    kind: StorageKind,
    options: &StorageOptions,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match kind {
        StorageKind::Memory => Arc::new(MemoryStorage::new(clock)),
        StorageKind::Session => Arc::new(SessionStorage::new(options.namespace.clone(), clock)),
        StorageKind::Durable => Arc::new(DurableStorage::open(options.dir.clone(), clock)?),
    };
    Ok(backend)
}
