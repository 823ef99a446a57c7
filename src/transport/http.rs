// src/transport/http.rs

//! `reqwest`-backed transport.

use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{FetchqError, Result, TransportError};
use crate::request::{Body, Method, RequestSpec};

use super::{BoxFuture, Response, Transport};

/// Real transport used in production.
///
/// Cloning a `reqwest::Client` is cheap and shares its connection pool, so
/// each call works on its own handle and the returned future does not borrow
/// `self` across `.await`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FetchqError::Other(e.into()))?;
        Ok(Self { client })
    }

    /// Wrap a preconfigured client (proxies, TLS roots, default headers).
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: RequestSpec,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, std::result::Result<Response, TransportError>> {
        let client = self.client.clone();

        Box::pin(async move {
            let url = request.url.clone();
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(url = %url, "transport call canceled");
                    Err(TransportError::Canceled)
                }
                result = execute(client, request) => result,
            }
        })
    }
}

async fn execute(
    client: reqwest::Client,
    request: RequestSpec,
) -> std::result::Result<Response, TransportError> {
    let mut builder = client.request(to_reqwest_method(request.method), &request.url);

    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(timeout) = request.timeout {
        builder = builder.timeout(timeout);
    }

    builder = match request.body {
        Body::Empty => builder,
        Body::Text(text) => builder.body(text),
        Body::Bytes(bytes) => builder.body(bytes),
        Body::Json(value) => {
            let bytes = serde_json::to_vec(&value)
                .map_err(|e| TransportError::Network(format!("encoding JSON body: {e}")))?;
            builder.header(CONTENT_TYPE, "application/json").body(bytes)
        }
    };

    let response = builder.send().await.map_err(map_reqwest_error)?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();

    debug!(status, bytes = body.len(), "transport received response");

    Ok(Response {
        status,
        headers,
        body,
    })
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}
