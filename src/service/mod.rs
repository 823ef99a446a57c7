// src/service/mod.rs

//! Public request API.
//!
//! [`RequestService`] resolves options, runs interceptors, fingerprints the
//! request, consults the cache, and hands the transport call to the
//! scheduler. Failed attempts go through the retry policy; each retry is a
//! fresh submission.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::RequestCache;
use crate::clock::{Clock, SystemClock};
use crate::engine::{into_work, Outcome, Scheduler};
use crate::errors::{RequestError, TransportError};
use crate::request::{fingerprint, resolve_url, Body, Fingerprint, Method, RequestSpec};
use crate::storage::open_backend;
use crate::transport::{Response, Transport};
use crate::types::StorageKind;

pub mod interceptor;
pub mod options;
pub mod retry;

pub use interceptor::{Intercept, RequestInterceptor, ResponseInterceptor};
pub use options::{
    CacheConfig, CacheOption, CacheOverrides, RequestOptions, ResolvedCache, ResolvedOptions,
    ResolvedRetry, RetryCallback, RetryConfig, RetryOption, RetryOverrides, RetryPredicate,
    ServiceConfig,
};
pub use retry::{delay_for, is_retryable_by_default, RetryDecision, RetryPhase, RetryState};

const DEFAULT_CANCEL_REASON: &str = "canceled by caller";

/// Requests sleeping between retry attempts. They hold no scheduler slot,
/// so cancellation reaches them through here.
#[derive(Default)]
struct Backoffs {
    next_key: u64,
    waiting: HashMap<u64, (Fingerprint, oneshot::Sender<String>)>,
}

impl Backoffs {
    /// Wake every waiter whose fingerprint matches with `reason`.
    fn cancel(&mut self, matches: impl Fn(&str) -> bool, reason: &str) -> usize {
        let keys: Vec<u64> = self
            .waiting
            .iter()
            .filter(|(_, (id, _))| matches(id.as_str()))
            .map(|(key, _)| *key)
            .collect();

        for key in &keys {
            if let Some((_, wake)) = self.waiting.remove(key) {
                let _ = wake.send(reason.to_string());
            }
        }
        keys.len()
    }
}

/// Drops the registry entry however the backoff ends.
struct BackoffEntry<'a> {
    backoffs: &'a Mutex<Backoffs>,
    key: u64,
}

impl Drop for BackoffEntry<'_> {
    fn drop(&mut self) {
        self.backoffs.lock().waiting.remove(&self.key);
    }
}

/// Builder for [`RequestService`].
pub struct ServiceBuilder<X: Transport> {
    transport: X,
    config: ServiceConfig,
    clock: Arc<dyn Clock>,
    request_interceptors: Vec<Box<dyn RequestInterceptor>>,
    response_interceptors: Vec<Box<dyn ResponseInterceptor>>,
}

impl<X: Transport> ServiceBuilder<X> {
    pub fn new(transport: X) -> Self {
        Self {
            transport,
            config: ServiceConfig::default(),
            clock: Arc::new(SystemClock),
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
        }
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock used for cache expiry.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn request_interceptor(mut self, interceptor: impl RequestInterceptor) -> Self {
        self.request_interceptors.push(Box::new(interceptor));
        self
    }

    pub fn response_interceptor(mut self, interceptor: impl ResponseInterceptor) -> Self {
        self.response_interceptors.push(Box::new(interceptor));
        self
    }

    /// Build the service and spawn its scheduler. Must be called from
    /// within a Tokio runtime.
    pub fn build(self) -> RequestService<X> {
        let scheduler = Scheduler::spawn(self.config.max_concurrent);
        RequestService {
            transport: Arc::new(self.transport),
            config: self.config,
            scheduler,
            clock: self.clock,
            caches: Mutex::new(HashMap::new()),
            backoffs: Mutex::new(Backoffs::default()),
            request_interceptors: self.request_interceptors,
            response_interceptors: self.response_interceptors,
        }
    }
}

/// Client-side request orchestrator over a [`Transport`].
pub struct RequestService<X: Transport> {
    transport: Arc<X>,
    config: ServiceConfig,
    scheduler: Scheduler<Response>,
    clock: Arc<dyn Clock>,
    /// Backends are opened on first use, one per storage kind.
    caches: Mutex<HashMap<StorageKind, RequestCache>>,
    backoffs: Mutex<Backoffs>,
    request_interceptors: Vec<Box<dyn RequestInterceptor>>,
    response_interceptors: Vec<Box<dyn ResponseInterceptor>>,
}

impl<X: Transport> fmt::Debug for RequestService<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestService")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl<X: Transport> RequestService<X> {
    pub fn builder(transport: X) -> ServiceBuilder<X> {
        ServiceBuilder::new(transport)
    }

    /// Service with `config` and no interceptors.
    pub fn new(transport: X, config: ServiceConfig) -> Self {
        ServiceBuilder::new(transport).config(config).build()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler<Response> {
        &self.scheduler
    }

    /// Issue one logical request: every retry included, one outcome back.
    pub async fn request(&self, spec: RequestSpec, options: RequestOptions) -> Outcome<Response> {
        let resolved = ResolvedOptions::resolve(&self.config, &options);
        let spec = self.prepare(spec, &resolved);

        let spec = match self.intercept_request(spec) {
            Intercept::Continue(spec) => spec,
            Intercept::Respond(outcome) => {
                debug!("request answered by interceptor");
                return outcome;
            }
        };

        let id = fingerprint(&spec);
        debug!(
            fingerprint = %id,
            method = %spec.method,
            url = %spec.url,
            priority = %resolved.priority,
            "request"
        );

        let outcome = self.execute(&spec, &id, &resolved).await;
        self.intercept_response(&spec, outcome)
    }

    pub async fn get(&self, url: impl Into<String>, options: RequestOptions) -> Outcome<Response> {
        self.request(RequestSpec::new(Method::Get, url), options).await
    }

    pub async fn post(
        &self,
        url: impl Into<String>,
        body: Body,
        options: RequestOptions,
    ) -> Outcome<Response> {
        self.request(RequestSpec::new(Method::Post, url).body(body), options)
            .await
    }

    pub async fn put(
        &self,
        url: impl Into<String>,
        body: Body,
        options: RequestOptions,
    ) -> Outcome<Response> {
        self.request(RequestSpec::new(Method::Put, url).body(body), options)
            .await
    }

    pub async fn patch(
        &self,
        url: impl Into<String>,
        body: Body,
        options: RequestOptions,
    ) -> Outcome<Response> {
        self.request(RequestSpec::new(Method::Patch, url).body(body), options)
            .await
    }

    pub async fn delete(&self, url: impl Into<String>, options: RequestOptions) -> Outcome<Response> {
        self.request(RequestSpec::new(Method::Delete, url), options)
            .await
    }

    pub async fn head(&self, url: impl Into<String>, options: RequestOptions) -> Outcome<Response> {
        self.request(RequestSpec::new(Method::Head, url), options).await
    }

    pub async fn options(&self, url: impl Into<String>, options: RequestOptions) -> Outcome<Response> {
        self.request(RequestSpec::new(Method::Options, url), options)
            .await
    }

    /// Fingerprint `spec` the way [`request`](Self::request) would, with the
    /// base URL applied. Request interceptors are not run.
    pub fn fingerprint(&self, spec: &RequestSpec) -> Fingerprint {
        let mut resolved = spec.clone();
        resolved.url = resolve_url(self.config.base_url.as_deref(), &spec.url);
        fingerprint(&resolved)
    }

    /// Cancel every pending, running or backing-off request with this
    /// fingerprint.
    pub async fn cancel(&self, fingerprint: &str, reason: Option<&str>) -> usize {
        let reason = reason.unwrap_or(DEFAULT_CANCEL_REASON);
        let scheduled = self.scheduler.cancel(fingerprint, reason).await;
        let backing_off = self.backoffs.lock().cancel(|id| id == fingerprint, reason);
        scheduled + backing_off
    }

    /// Cancel everything, including requests waiting to retry.
    pub async fn cancel_all(&self, reason: Option<&str>) -> usize {
        let reason = reason.unwrap_or(DEFAULT_CANCEL_REASON);
        let scheduled = self.scheduler.cancel_all(reason).await;
        let backing_off = self.backoffs.lock().cancel(|_| true, reason);
        scheduled + backing_off
    }

    /// Number of requests currently sleeping before a retry.
    pub fn backing_off(&self) -> usize {
        self.backoffs.lock().waiting.len()
    }

    /// Empty every cache backend this service has opened.
    pub fn clear_cache(&self) {
        let caches: Vec<_> = self.caches.lock().values().cloned().collect();
        for cache in caches {
            cache.clear();
        }
    }

    /// Apply the base URL, default headers and default timeout.
    fn prepare(&self, mut spec: RequestSpec, resolved: &ResolvedOptions) -> RequestSpec {
        spec.url = resolve_url(self.config.base_url.as_deref(), &spec.url);
        for (name, value) in &self.config.headers {
            spec.headers
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        spec.timeout = spec.timeout.or(resolved.timeout);
        spec
    }

    fn intercept_request(&self, mut spec: RequestSpec) -> Intercept {
        for interceptor in &self.request_interceptors {
            match interceptor.intercept(spec) {
                Intercept::Continue(next) => spec = next,
                respond @ Intercept::Respond(_) => return respond,
            }
        }
        Intercept::Continue(spec)
    }

    fn intercept_response(&self, spec: &RequestSpec, mut outcome: Outcome<Response>) -> Outcome<Response> {
        for interceptor in &self.response_interceptors {
            outcome = interceptor.intercept(spec, outcome);
        }
        outcome
    }

    async fn execute(
        &self,
        spec: &RequestSpec,
        id: &str,
        resolved: &ResolvedOptions,
    ) -> Outcome<Response> {
        let cache = resolved
            .cache
            .and_then(|settings| self.cache_for(settings.storage).map(|cache| (cache, settings.ttl)));
        let mut retry = RetryState::new();

        loop {
            if let Some((cache, _)) = &cache
                && let Some(hit) = cache.get(id).await
            {
                retry.on_success();
                return Ok(hit);
            }

            match self.dispatch(spec.clone(), id, resolved).await {
                Ok(response) => {
                    retry.on_success();
                    if let Some((cache, ttl)) = &cache
                        && RequestCache::is_cacheable(&response)
                    {
                        cache.set(id, &response, *ttl).await;
                    }
                    return Ok(response);
                }
                Err(error) => match retry.on_failure(error, resolved.retry.as_ref()) {
                    RetryDecision::Retry { delay, .. } => self.back_off(id, delay).await?,
                    RetryDecision::GiveUp(error) => return Err(error),
                },
            }
        }
    }

    /// Sleep out a retry delay unless `cancel`/`cancel_all` fires first.
    async fn back_off(&self, id: &str, delay: Duration) -> Outcome<()> {
        let (wake, woken) = oneshot::channel();
        let key = {
            let mut backoffs = self.backoffs.lock();
            let key = backoffs.next_key;
            backoffs.next_key += 1;
            backoffs.waiting.insert(key, (id.to_string(), wake));
            key
        };
        let _entry = BackoffEntry {
            backoffs: &self.backoffs,
            key,
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            Ok(reason) = woken => {
                debug!(fingerprint = %id, %reason, "canceled while waiting to retry");
                Err(RequestError::Canceled { reason })
            }
        }
    }

    /// One attempt: submit the transport call to the scheduler and wait.
    async fn dispatch(
        &self,
        spec: RequestSpec,
        id: &str,
        resolved: &ResolvedOptions,
    ) -> Outcome<Response> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let transport = Arc::clone(&self.transport);

        let work = into_work(move || async move {
            let timeout = spec.timeout;
            let call = async {
                tokio::select! {
                    _ = token.cancelled() => Err(TransportError::Canceled),
                    result = transport.send(spec, token.clone()) => result,
                }
            };

            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => {
                        token.cancel();
                        Err(TransportError::Timeout)
                    }
                },
                None => call.await,
            };

            match result {
                Ok(response) if response.is_success() => Ok(response),
                Ok(response) => Err(RequestError::HttpStatus {
                    status: response.status,
                    response: Box::new(response),
                }),
                Err(e) => Err(RequestError::Transport(e)),
            }
        });

        self.scheduler
            .submit(id, resolved.priority, resolved.duplicate, cancel, work)
            .await
    }

    fn cache_for(&self, kind: StorageKind) -> Option<RequestCache> {
        let mut caches = self.caches.lock();
        if let Some(cache) = caches.get(&kind) {
            return Some(cache.clone());
        }

        match open_backend(kind, &self.config.cache.storage_options(), Arc::clone(&self.clock)) {
            Ok(backend) => {
                let cache = RequestCache::new(backend);
                caches.insert(kind, cache.clone());
                Some(cache)
            }
            Err(e) => {
                warn!(storage = %kind, error = %e, "failed to open cache storage; not caching");
                None
            }
        }
    }
}
