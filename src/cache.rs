// src/cache.rs

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::storage::StorageBackend;
use crate::transport::Response;
use crate::types::StorageKind;

/// Response cache keyed by request fingerprint.
///
/// Caching is best-effort: every storage failure is logged and turned into a
/// miss (on read) or a no-op (on write). Responses are serialized on the way
/// in and decoded on the way out, so callers always own what they get back
/// and can never mutate what is stored.
///
/// Durable reads and writes rewrite a whole file, so they run on Tokio's
/// blocking pool.
#[derive(Debug, Clone)]
pub struct RequestCache {
    storage: Arc<dyn StorageBackend>,
}

impl RequestCache {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub fn kind(&self) -> StorageKind {
        self.storage.kind()
    }

    /// Only successful responses are worth replaying.
    pub fn is_cacheable(response: &Response) -> bool {
        response.is_success()
    }

    fn blocks(&self) -> bool {
        self.kind() == StorageKind::Durable
    }

    /// Look up a cached response.
    pub async fn get(&self, id: &str) -> Option<Response> {
        if !self.blocks() {
            return self.read(id);
        }

        let cache = self.clone();
        let key = id.to_string();
        match tokio::task::spawn_blocking(move || cache.read(&key)).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(fingerprint = %id, error = %e, "cache read task failed; treating as miss");
                None
            }
        }
    }

    /// Store a response for `ttl`.
    pub async fn set(&self, id: &str, response: &Response, ttl: Duration) {
        let value = match serde_json::to_value(response) {
            Ok(value) => value,
            Err(e) => {
                warn!(fingerprint = %id, error = %e, "failed to encode response for cache");
                return;
            }
        };

        if !self.blocks() {
            return self.write(id, value, ttl);
        }

        let cache = self.clone();
        let key = id.to_string();
        if let Err(e) = tokio::task::spawn_blocking(move || cache.write(&key, value, ttl)).await {
            warn!(fingerprint = %id, error = %e, "cache write task failed");
        }
    }

    fn read(&self, id: &str) -> Option<Response> {
        let value = match self.storage.get(id) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(fingerprint = %id, storage = %self.kind(), "cache miss");
                return None;
            }
            Err(e) => {
                warn!(fingerprint = %id, storage = %self.kind(), error = %e, "cache read failed; treating as miss");
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(response) => {
                debug!(fingerprint = %id, storage = %self.kind(), "cache hit");
                Some(response)
            }
            Err(e) => {
                warn!(fingerprint = %id, error = %e, "cached value is not a response; removing");
                if let Err(e) = self.storage.remove(id) {
                    warn!(fingerprint = %id, error = %e, "failed to remove undecodable cache entry");
                }
                None
            }
        }
    }

    fn write(&self, id: &str, value: serde_json::Value, ttl: Duration) {
        match self.storage.set(id, value, ttl) {
            Ok(()) => debug!(fingerprint = %id, storage = %self.kind(), ttl_ms = ttl.as_millis() as u64, "cached response"),
            Err(e) => warn!(fingerprint = %id, storage = %self.kind(), error = %e, "cache write failed"),
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.storage.clear() {
            warn!(storage = %self.kind(), error = %e, "cache clear failed");
        }
    }
}
