// src/request/fingerprint.rs

//! Request fingerprints.
//!
//! A fingerprint identifies "the same request" for deduplication and as the
//! cache key. It covers the method, URL, query parameters and body. Headers
//! and timeouts are deliberately left out.
//!
//! Query pairs are sorted and JSON object keys are visited in sorted order,
//! so `?a=1&b=2` and `?b=2&a=1` (or `{"x":1,"y":2}` and `{"y":2,"x":1}`)
//! collide.

use blake3::Hasher;
use serde_json::Value;

use super::{Body, RequestSpec};

/// Hex-encoded blake3 digest of a request.
pub type Fingerprint = String;

/// Compute the fingerprint of a request.
pub fn fingerprint(spec: &RequestSpec) -> Fingerprint {
    let mut hasher = Hasher::new();

    update_field(&mut hasher, spec.method.as_str().as_bytes());
    update_field(&mut hasher, spec.url.as_bytes());

    let mut query: Vec<&(String, String)> = spec.query.iter().collect();
    query.sort();
    hasher.update(&(query.len() as u64).to_le_bytes());
    for (key, value) in query {
        update_field(&mut hasher, key.as_bytes());
        update_field(&mut hasher, value.as_bytes());
    }

    match &spec.body {
        Body::Empty => {
            hasher.update(b"e");
        }
        Body::Text(text) => {
            hasher.update(b"t");
            update_field(&mut hasher, text.as_bytes());
        }
        Body::Bytes(bytes) => {
            hasher.update(b"b");
            update_field(&mut hasher, bytes);
        }
        Body::Json(value) => {
            hasher.update(b"j");
            update_json(&mut hasher, value);
        }
    }

    hasher.finalize().to_hex().to_string()
}

/// Length-prefixed so adjacent fields cannot run into each other.
fn update_field(hasher: &mut Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn update_json(hasher: &mut Hasher, value: &Value) {
    match value {
        Value::Null => {
            hasher.update(b"n");
        }
        Value::Bool(b) => {
            hasher.update(if *b { b"T" } else { b"F" });
        }
        Value::Number(n) => {
            hasher.update(b"#");
            update_field(hasher, n.to_string().as_bytes());
        }
        Value::String(s) => {
            hasher.update(b"s");
            update_field(hasher, s.as_bytes());
        }
        Value::Array(items) => {
            hasher.update(b"[");
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                update_json(hasher, item);
            }
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            hasher.update(b"{");
            hasher.update(&(keys.len() as u64).to_le_bytes());
            for key in keys {
                update_field(hasher, key.as_bytes());
                update_json(hasher, &map[key]);
            }
        }
    }
}
