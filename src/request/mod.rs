// src/request/mod.rs

//! Request description handed to the service and, after option resolution,
//! to the transport.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod fingerprint;

pub use crate::types::Method;
pub use fingerprint::{Fingerprint, fingerprint};

/// Request payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Json(Value),
    Bytes(Vec<u8>),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }
}

/// A single HTTP request.
///
/// Query parameters are kept as ordered pairs so repeated keys survive;
/// fingerprinting sorts them, so the order callers add them in does not
/// matter for deduplication or caching.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Body,
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            query: Vec::new(),
            body: Body::Empty,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn json(self, value: Value) -> Self {
        self.body(Body::Json(value))
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.body(Body::Text(text.into()))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Join a possibly relative `url` onto `base_url`.
///
/// Absolute URLs (anything with a scheme) are returned unchanged, as is
/// everything when there is no base URL.
pub fn resolve_url(base_url: Option<&str>, url: &str) -> String {
    let Some(base) = base_url else {
        return url.to_string();
    };

    if url.contains("://") {
        return url.to_string();
    }

    match (base.ends_with('/'), url.starts_with('/')) {
        (true, true) => format!("{}{}", base, &url[1..]),
        (false, false) if !url.is_empty() => format!("{base}/{url}"),
        _ => format!("{base}{url}"),
    }
}
