// src/transport/mod.rs

//! Pluggable HTTP transport abstraction.
//!
//! The request service never talks to the network directly; it hands each
//! resolved [`RequestSpec`] to a [`Transport`]. This keeps connection
//! handling, TLS and DNS out of the orchestration layer and lets tests swap
//! in a scripted fake.
//!
//! - [`ReqwestTransport`] is the production implementation used by the CLI.
//! - Tests provide their own `Transport` that, for example, records calls and
//!   replays canned responses.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::request::RequestSpec;

pub mod http;

pub use http::ReqwestTransport;

/// Boxed, sendable future, as returned by [`Transport::send`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstracting how a request is put on the wire.
///
/// Implementations must observe `cancel`: once it fires they should abort the
/// call and return [`TransportError::Canceled`]. Any HTTP status, including
/// 4xx/5xx, is a successful transport outcome; the service decides what a
/// status means.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: RequestSpec,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<Response, TransportError>>;
}

/// HTTP response as seen by callers and stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}
