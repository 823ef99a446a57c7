// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::request::RequestSpec;
use crate::service::{RequestOptions, ServiceConfig};
use crate::types::{DuplicatePolicy, Method, RetryTiming, StorageKind};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [service]
/// base_url = "http://localhost:23520"
/// max_concurrent = 6
///
/// [service.retry]
/// enabled = true
/// timing = "exponential"
///
/// [[request]]
/// url = "/api"
/// priority = 9
/// duplicate = "link"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Service defaults from `[service]`.
    #[serde(default)]
    pub service: ServiceSection,

    /// Requests from `[[request]]`, in file order.
    #[serde(default)]
    pub request: Vec<RequestEntry>,
}

/// `[service]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Default request timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default)]
    pub duplicate: DuplicatePolicy,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub cache: CacheSection,
}

fn default_max_concurrent() -> usize {
    crate::service::options::DEFAULT_MAX_CONCURRENT
}

fn default_priority() -> u8 {
    crate::engine::Priority::DEFAULT.get()
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            base_url: None,
            max_concurrent: default_max_concurrent(),
            timeout_ms: None,
            priority: default_priority(),
            duplicate: DuplicatePolicy::default(),
            headers: BTreeMap::new(),
            retry: RetrySection::default(),
            cache: CacheSection::default(),
        }
    }
}

/// `[service.retry]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_retry_max_count")]
    pub max_count: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,

    #[serde(default)]
    pub timing: RetryTiming,
}

fn default_retry_max_count() -> u32 {
    crate::service::options::DEFAULT_RETRY_MAX_COUNT
}

fn default_retry_delay_ms() -> u64 {
    crate::service::options::DEFAULT_RETRY_DELAY.as_millis() as u64
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            enabled: false,
            max_count: default_retry_max_count(),
            delay_ms: default_retry_delay_ms(),
            timing: RetryTiming::default(),
        }
    }
}

/// `[service.cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub storage: StorageKind,

    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,

    /// Directory for durable storage. Defaults to `.fetchq`.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Key prefix for session storage. Defaults to `fetchq`.
    #[serde(default)]
    pub namespace: Option<String>,
}

fn default_cache_ttl_ms() -> u64 {
    crate::service::options::DEFAULT_CACHE_TTL.as_millis() as u64
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: false,
            storage: StorageKind::default(),
            ttl_ms: default_cache_ttl_ms(),
            dir: None,
            namespace: None,
        }
    }
}

/// One `[[request]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEntry {
    #[serde(default)]
    pub method: Method,

    /// Absolute, or relative to `service.base_url`.
    pub url: String,

    #[serde(default)]
    pub priority: Option<u8>,

    #[serde(default)]
    pub duplicate: Option<DuplicatePolicy>,

    /// `retry = false`, `retry = true`, or a table overriding
    /// `[service.retry]`.
    #[serde(default)]
    pub retry: Option<RetryField>,

    /// `cache = false`, `cache = true`, or a table with `storage`/`ttl_ms`.
    #[serde(default)]
    pub cache: Option<CacheField>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub query: BTreeMap<String, String>,

    /// JSON body.
    #[serde(default)]
    pub body: Option<Value>,

    /// Plain-text body. Mutually exclusive with `body`.
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RetryField {
    Flag(bool),
    Table(RetryTable),
}

/// Per-request retry table. Present means enabled unless it says otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryTable {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub max_count: Option<u32>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub timing: Option<RetryTiming>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CacheField {
    Flag(bool),
    Table(CacheTable),
}

/// Per-request cache table. Present means enabled unless it says otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheTable {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub storage: Option<StorageKind>,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

/// Validated configuration, ready to build a service from.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub service: ServiceConfig,
    pub requests: Vec<PlannedRequest>,
}

/// A `[[request]]` entry turned into what the service accepts.
#[derive(Debug, Clone)]
pub struct PlannedRequest {
    pub spec: RequestSpec,
    pub options: RequestOptions,
}
