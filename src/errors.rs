// src/errors.rs

//! Crate-wide error types.
//!
//! - [`FetchqError`] covers configuration and IO failures at the edges.
//! - [`TransportError`] is what a [`crate::transport::Transport`] reports.
//! - [`RequestError`] is the single terminal error a caller of the request
//!   service receives for one logical request.

use thiserror::Error;

use crate::transport::Response;

#[derive(Error, Debug)]
pub enum FetchqError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FetchqError>;

/// Failure reported by the underlying HTTP transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport call canceled")]
    Canceled,
}

/// Terminal outcome of a failed request.
#[derive(Error, Debug, Clone)]
pub enum RequestError {
    #[error("duplicate request rejected: {fingerprint}")]
    DuplicateRejected { fingerprint: String },

    #[error("request superseded by a newer duplicate: {fingerprint}")]
    Superseded { fingerprint: String },

    #[error("request canceled: {reason}")]
    Canceled { reason: String },

    #[error("request queue cleared: {reason}")]
    QueueCleared { reason: String },

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP status {status}")]
    HttpStatus { status: u16, response: Box<Response> },

    #[error("retries exhausted after {retries} retries: {last}")]
    RetryExhausted { retries: u32, last: Box<RequestError> },

    #[error("request rejected by interceptor: {0}")]
    Interceptor(String),

    #[error("request scheduler is no longer running")]
    SchedulerClosed,
}

impl RequestError {
    /// Errors produced by an explicit scheduling decision rather than a
    /// transient failure. These are never retried.
    pub fn is_scheduler_decision(&self) -> bool {
        matches!(
            self,
            RequestError::DuplicateRejected { .. }
                | RequestError::Superseded { .. }
                | RequestError::Canceled { .. }
                | RequestError::QueueCleared { .. }
                | RequestError::SchedulerClosed
        )
    }

    /// Whether the failure is an explicit cancellation, either by the
    /// scheduler or by the transport observing its cancellation token.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            RequestError::Canceled { .. } | RequestError::Transport(TransportError::Canceled)
        )
    }

    /// HTTP status code for status errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::HttpStatus { status, .. } => Some(*status),
            RequestError::RetryExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}
