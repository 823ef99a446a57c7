// src/storage/durable.rs

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::types::StorageKind;

use super::{StorageBackend, StoredEntry};

/// File name of the cache inside the storage directory.
///
/// The effective path on disk is `<dir>/cache.json`.
pub const CACHE_FILE_NAME: &str = "cache.json";

/// Stores entries in a JSON file so they survive restarts.
///
/// Every operation re-reads the file, so several processes pointing at the
/// same directory see each other's writes (last writer wins). The mutex only
/// serializes access from within this process.
#[derive(Debug)]
pub struct DurableStorage {
    path: PathBuf,
    lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl DurableStorage {
    /// Open (and create if needed) the storage directory.
    pub fn open(dir: PathBuf, clock: Arc<dyn Clock>) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache directory at {:?}", dir))?;
        Ok(Self {
            path: dir.join(CACHE_FILE_NAME),
            lock: Mutex::new(()),
            clock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for DurableStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Durable
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock();
        let mut map = load_all_entries(&self.path)?;

        let expired = match map.get(key) {
            None => return Ok(None),
            Some(entry) => entry.is_expired(self.clock.now_millis()),
        };

        if expired {
            map.remove(key);
            save_all_entries(&self.path, &map)?;
            debug!(key, "evicted expired entry (durable)");
            return Ok(None);
        }

        Ok(map.remove(key).map(|entry| entry.value))
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let _guard = self.lock.lock();
        let now = self.clock.now_millis();
        let mut map = load_all_entries(&self.path)?;

        // Opportunistically drop anything that has already expired.
        let before = map.len();
        map.retain(|_, entry| !entry.is_expired(now));
        if map.len() < before {
            info!(removed = before - map.len(), "pruned expired cache entries (durable)");
        }

        map.insert(key.to_string(), StoredEntry::new(value, now, ttl));
        save_all_entries(&self.path, &map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut map = load_all_entries(&self.path)?;
        if map.remove(key).is_some() {
            save_all_entries(&self.path, &map)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock();
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("removing cache file at {:?}", self.path))?;
        }
        Ok(())
    }
}

/// Load every stored entry from the cache file.
fn load_all_entries(path: &Path) -> Result<HashMap<String, StoredEntry>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let file = File::open(path).with_context(|| format!("opening cache file at {:?}", path))?;
    let map = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("decoding cache file at {:?}", path))?;
    Ok(map)
}

/// Persist every entry, replacing the file atomically.
fn save_all_entries(path: &Path, map: &HashMap<String, StoredEntry>) -> Result<()> {
    let tmp = path.with_extension("json.tmp");

    let file = File::create(&tmp).with_context(|| format!("creating cache file at {:?}", tmp))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, map)
        .with_context(|| format!("encoding cache file at {:?}", tmp))?;
    writer.flush()?;
    drop(writer);

    fs::rename(&tmp, path).with_context(|| format!("replacing cache file at {:?}", path))?;
    Ok(())
}
