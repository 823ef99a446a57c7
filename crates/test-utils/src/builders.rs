#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use fetchq::clock::Clock;
use fetchq::config::model::{RawConfigFile, RequestEntry};
use fetchq::config::ConfigFile;
use fetchq::engine::{into_work, Outcome, Work};
use fetchq::service::{CacheConfig, RequestService, RetryConfig, ServiceConfig};
use fetchq::types::{DuplicatePolicy, Method, RetryTiming, StorageKind};
use tokio::sync::oneshot;

use crate::fake_transport::FakeTransport;

/// Builder for `ServiceConfig` to simplify test setup.
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
        }
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.max_concurrent = n;
        self
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.config.base_url = Some(url.to_string());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.config.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn duplicate(mut self, policy: DuplicatePolicy) -> Self {
        self.config.duplicate = policy;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Enable retry with the given budget, delay and timing.
    pub fn retry(mut self, max_count: u32, delay: Duration, timing: RetryTiming) -> Self {
        self.config.retry = RetryConfig {
            enabled: true,
            max_count,
            delay,
            timing,
            predicate: None,
            on_retry: None,
        };
        self
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Enable caching on `storage` with `ttl`.
    pub fn cache(mut self, storage: StorageKind, ttl: Duration) -> Self {
        self.config.cache = CacheConfig {
            enabled: true,
            storage,
            ttl,
            ..self.config.cache
        };
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config.cache.dir = dir.into();
        self
    }

    pub fn cache_namespace(mut self, namespace: &str) -> Self {
        self.config.cache.namespace = namespace.to_string();
        self
    }

    pub fn build(self) -> ServiceConfig {
        self.config
    }
}

impl Default for ServiceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a service over `transport`, optionally with a custom clock.
pub fn service(
    transport: FakeTransport,
    config: ServiceConfig,
    clock: Option<Arc<dyn Clock>>,
) -> RequestService<FakeTransport> {
    let mut builder = RequestService::builder(transport).config(config);
    if let Some(clock) = clock {
        builder = builder.clock(clock);
    }
    builder.build()
}

/// Builder for `RawConfigFile`, validated into a `ConfigFile` on `build`.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.config.service.base_url = Some(url.to_string());
        self
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.service.max_concurrent = n;
        self
    }

    pub fn with_request(mut self, entry: RequestEntry) -> Self {
        self.config.request.push(entry);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for one `[[request]]` entry.
pub struct RequestEntryBuilder {
    entry: RequestEntry,
}

impl RequestEntryBuilder {
    pub fn new(url: &str) -> Self {
        Self {
            entry: RequestEntry {
                method: Method::Get,
                url: url.to_string(),
                priority: None,
                duplicate: None,
                retry: None,
                cache: None,
                headers: Default::default(),
                query: Default::default(),
                body: None,
                text: None,
                timeout_ms: None,
            },
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.entry.method = method;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.entry.priority = Some(priority);
        self
    }

    pub fn duplicate(mut self, policy: DuplicatePolicy) -> Self {
        self.entry.duplicate = Some(policy);
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.entry.body = Some(body);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.entry.text = Some(text.to_string());
        self
    }

    pub fn build(self) -> RequestEntry {
        self.entry
    }
}

/// Work that resolves to `value` straight away.
pub fn ready_work<T: Send + 'static>(value: T) -> Work<T> {
    into_work(move || async move { Ok(value) })
}

/// Work that waits for the returned sender before resolving. Also reports
/// through `started` when it begins running.
pub fn gated_work<T: Send + 'static>(
    started: Option<oneshot::Sender<()>>,
) -> (Work<T>, oneshot::Sender<Outcome<T>>) {
    let (tx, rx) = oneshot::channel::<Outcome<T>>();
    let work = into_work(move || async move {
        if let Some(started) = started {
            let _ = started.send(());
        }
        rx.await.unwrap_or(Err(fetchq::errors::RequestError::SchedulerClosed))
    });
    (work, tx)
}
