// src/service/options.rs

//! Service-wide defaults, per-request overrides, and the resolved options
//! a single logical request runs with.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::Priority;
use crate::errors::RequestError;
use crate::storage::StorageOptions;
use crate::types::{DuplicatePolicy, RetryTiming, StorageKind};

/// Decides whether a failure is worth retrying. Receives the error and the
/// number of retries already performed.
pub type RetryPredicate = Arc<dyn Fn(&RequestError, u32) -> bool + Send + Sync>;

/// Observes each retry: the error that triggered it, the 1-based retry
/// number and the delay about to be slept.
pub type RetryCallback = Arc<dyn Fn(&RequestError, u32, Duration) + Send + Sync>;

pub const DEFAULT_MAX_CONCURRENT: usize = 5;
pub const DEFAULT_RETRY_MAX_COUNT: u32 = 2;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Service-level retry defaults.
#[derive(Clone)]
pub struct RetryConfig {
    /// Whether requests that don't say otherwise are retried.
    pub enabled: bool,
    pub max_count: u32,
    pub delay: Duration,
    pub timing: RetryTiming,
    pub predicate: Option<RetryPredicate>,
    pub on_retry: Option<RetryCallback>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_count: DEFAULT_RETRY_MAX_COUNT,
            delay: DEFAULT_RETRY_DELAY,
            timing: RetryTiming::default(),
            predicate: None,
            on_retry: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("enabled", &self.enabled)
            .field("max_count", &self.max_count)
            .field("delay", &self.delay)
            .field("timing", &self.timing)
            .field("predicate", &self.predicate.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn predicate<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestError, u32) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(f));
        self
    }

    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestError, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(f));
        self
    }
}

/// Service-level cache defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Whether requests that don't say otherwise are cached.
    pub enabled: bool,
    pub storage: StorageKind,
    pub ttl: Duration,
    /// Where durable storage keeps `cache.json`.
    pub dir: PathBuf,
    /// Key prefix for session storage.
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let storage = StorageOptions::default();
        Self {
            enabled: false,
            storage: StorageKind::default(),
            ttl: DEFAULT_CACHE_TTL,
            dir: storage.dir,
            namespace: storage.namespace,
        }
    }
}

impl CacheConfig {
    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            dir: self.dir.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Configuration of one [`crate::service::RequestService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Prefix for relative request URLs.
    pub base_url: Option<String>,
    /// Ceiling on concurrently running requests. Clamped to at least 1.
    pub max_concurrent: usize,
    /// Default per-request timeout.
    pub timeout: Option<Duration>,
    pub priority: Priority,
    pub duplicate: DuplicatePolicy,
    /// Headers added to every request unless the request sets them itself.
    pub headers: BTreeMap<String, String>,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout: None,
            priority: Priority::DEFAULT,
            duplicate: DuplicatePolicy::default(),
            headers: BTreeMap::new(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Per-request retry overrides. Unset fields fall back to the service.
#[derive(Clone, Default)]
pub struct RetryOverrides {
    pub max_count: Option<u32>,
    pub delay: Option<Duration>,
    pub timing: Option<RetryTiming>,
    pub predicate: Option<RetryPredicate>,
    pub on_retry: Option<RetryCallback>,
}

impl fmt::Debug for RetryOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOverrides")
            .field("max_count", &self.max_count)
            .field("delay", &self.delay)
            .field("timing", &self.timing)
            .field("predicate", &self.predicate.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl RetryOverrides {
    pub fn max_count(mut self, max_count: u32) -> Self {
        self.max_count = Some(max_count);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn timing(mut self, timing: RetryTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn predicate<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestError, u32) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(f));
        self
    }

    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestError, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(f));
        self
    }
}

/// Retry setting of a single request.
#[derive(Debug, Clone, Default)]
pub enum RetryOption {
    /// Use the service's `retry.enabled`.
    #[default]
    Inherit,
    Disabled,
    Enabled,
    /// Enabled, with some settings overridden.
    Custom(RetryOverrides),
}

/// Per-request cache overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheOverrides {
    pub storage: Option<StorageKind>,
    pub ttl: Option<Duration>,
}

/// Cache setting of a single request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheOption {
    /// Use the service's `cache.enabled`.
    #[default]
    Inherit,
    Disabled,
    Enabled,
    /// Enabled, with storage and/or TTL overridden.
    Custom(CacheOverrides),
}

/// Options a caller can pass with one request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub priority: Option<Priority>,
    pub duplicate: Option<DuplicatePolicy>,
    pub retry: RetryOption,
    pub cache: CacheOption,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    pub fn duplicate(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate = Some(policy);
        self
    }

    pub fn retry(mut self, retry: RetryOption) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(mut self, cache: CacheOption) -> Self {
        self.cache = cache;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Retry policy of one request with service defaults applied. Global and
/// per-request hooks are kept apart so both can run.
#[derive(Clone)]
pub struct ResolvedRetry {
    pub max_count: u32,
    pub delay: Duration,
    pub timing: RetryTiming,
    pub global_predicate: Option<RetryPredicate>,
    pub request_predicate: Option<RetryPredicate>,
    pub global_on_retry: Option<RetryCallback>,
    pub request_on_retry: Option<RetryCallback>,
}

impl fmt::Debug for ResolvedRetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedRetry")
            .field("max_count", &self.max_count)
            .field("delay", &self.delay)
            .field("timing", &self.timing)
            .field("global_predicate", &self.global_predicate.is_some())
            .field("request_predicate", &self.request_predicate.is_some())
            .finish_non_exhaustive()
    }
}

impl ResolvedRetry {
    fn from_config(config: &RetryConfig, overrides: Option<&RetryOverrides>) -> Self {
        let mut resolved = Self {
            max_count: config.max_count,
            delay: config.delay,
            timing: config.timing,
            global_predicate: config.predicate.clone(),
            request_predicate: None,
            global_on_retry: config.on_retry.clone(),
            request_on_retry: None,
        };
        if let Some(o) = overrides {
            resolved.max_count = o.max_count.unwrap_or(resolved.max_count);
            resolved.delay = o.delay.unwrap_or(resolved.delay);
            resolved.timing = o.timing.unwrap_or(resolved.timing);
            resolved.request_predicate = o.predicate.clone();
            resolved.request_on_retry = o.on_retry.clone();
        }
        resolved
    }
}

/// Cache policy of one request with service defaults applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCache {
    pub storage: StorageKind,
    pub ttl: Duration,
}

/// Everything one logical request runs with, resolved once up front.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub priority: Priority,
    pub duplicate: DuplicatePolicy,
    /// `None` when retry is disabled for this request.
    pub retry: Option<ResolvedRetry>,
    /// `None` when caching is disabled for this request.
    pub cache: Option<ResolvedCache>,
    pub timeout: Option<Duration>,
}

impl ResolvedOptions {
    pub fn resolve(config: &ServiceConfig, options: &RequestOptions) -> Self {
        let retry = match &options.retry {
            RetryOption::Inherit if config.retry.enabled => {
                Some(ResolvedRetry::from_config(&config.retry, None))
            }
            RetryOption::Inherit | RetryOption::Disabled => None,
            RetryOption::Enabled => Some(ResolvedRetry::from_config(&config.retry, None)),
            RetryOption::Custom(overrides) => {
                Some(ResolvedRetry::from_config(&config.retry, Some(overrides)))
            }
        };

        let service_cache = ResolvedCache {
            storage: config.cache.storage,
            ttl: config.cache.ttl,
        };
        let cache = match options.cache {
            CacheOption::Inherit if config.cache.enabled => Some(service_cache),
            CacheOption::Inherit | CacheOption::Disabled => None,
            CacheOption::Enabled => Some(service_cache),
            CacheOption::Custom(overrides) => Some(ResolvedCache {
                storage: overrides.storage.unwrap_or(service_cache.storage),
                ttl: overrides.ttl.unwrap_or(service_cache.ttl),
            }),
        };

        Self {
            priority: options.priority.unwrap_or(config.priority),
            duplicate: options.duplicate.unwrap_or(config.duplicate),
            retry,
            cache,
            timeout: options.timeout.or(config.timeout),
        }
    }
}
