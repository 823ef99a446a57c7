// src/lib.rs

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod request;
pub mod service;
pub mod storage;
pub mod transport;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::{load_and_validate, resolve_config_path, CONFIG_ENV};
use crate::config::model::{ConfigFile, PlannedRequest};
use crate::engine::Outcome;
use crate::request::{fingerprint, resolve_url, RequestSpec};
use crate::service::{RequestService, ResolvedOptions};
use crate::transport::{ReqwestTransport, Response, Transport};

pub use crate::errors::{FetchqError, RequestError, TransportError};
pub use crate::request::{Body, Method};
pub use crate::service::{RequestOptions, ServiceConfig};

/// Tally of one CLI run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the request service over the reqwest transport
/// - Ctrl-C handling (cancels everything in flight)
pub async fn run(args: CliArgs) -> Result<RunSummary> {
    let env_path = std::env::var(CONFIG_ENV).ok();
    let config_path = resolve_config_path(args.config.as_deref(), env_path.as_deref());
    let mut cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config from {:?}", config_path))?;

    if let Some(limit) = args.max_concurrent {
        debug!(limit = limit.get(), "max_concurrent overridden from the command line");
        cfg.service.max_concurrent = limit.get();
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(RunSummary::default());
    }

    let transport = ReqwestTransport::new()?;
    let service = Arc::new(RequestService::new(transport, cfg.service));

    // Ctrl-C → cancel everything still queued or running.
    {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let canceled = service.cancel_all(Some("interrupted")).await;
            info!(canceled, "interrupted; canceled outstanding requests");
        });
    }

    let summary = run_requests(service, cfg.requests).await;
    info!(
        total = summary.total(),
        succeeded = summary.succeeded,
        failed = summary.failed,
        "all requests settled"
    );
    Ok(summary)
}

/// Issue every planned request concurrently and print one line per result,
/// in plan order.
pub async fn run_requests<X: Transport>(
    service: Arc<RequestService<X>>,
    requests: Vec<PlannedRequest>,
) -> RunSummary {
    let expected = requests.len();
    let mut set = JoinSet::new();

    for (index, planned) in requests.into_iter().enumerate() {
        let service = Arc::clone(&service);
        set.spawn(async move {
            let id = service.fingerprint(&planned.spec);
            let mut spec = planned.spec.clone();
            spec.url = resolve_url(service.config().base_url.as_deref(), &spec.url);
            let outcome = service.request(planned.spec, planned.options).await;
            (index, spec, id, outcome)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!(error = %e, "request task did not complete"),
        }
    }
    results.sort_by_key(|(index, ..)| *index);

    let mut summary = RunSummary::default();
    for (_, spec, id, outcome) in &results {
        println!("{}", format_result_line(spec, id, outcome));
        if outcome.is_ok() {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }
    }
    // Requests whose task died count as failures.
    summary.failed += expected - results.len();
    summary
}

/// One line of CLI output for a settled request.
pub fn format_result_line(spec: &RequestSpec, id: &str, outcome: &Outcome<Response>) -> String {
    let short = &id[..id.len().min(12)];
    match outcome {
        Ok(response) => format!(
            "ok   {} {} status={} bytes={} id={}",
            spec.method,
            spec.url,
            response.status,
            response.body.len(),
            short
        ),
        Err(error) => format!("err  {} {} id={}: {}", spec.method, spec.url, short, error),
    }
}

/// Dry-run output: service settings, then each request with its
/// fingerprint and resolved priority.
fn print_dry_run(cfg: &ConfigFile) {
    let service = &cfg.service;

    println!("fetchq dry-run");
    println!(
        "  service.base_url = {}",
        service.base_url.as_deref().unwrap_or("(none)")
    );
    println!("  service.max_concurrent = {}", service.max_concurrent);
    println!(
        "  service.retry = {} (max_count={}, delay={:?}, timing={:?})",
        if service.retry.enabled { "on" } else { "off" },
        service.retry.max_count,
        service.retry.delay,
        service.retry.timing
    );
    println!(
        "  service.cache = {} (storage={}, ttl={:?})",
        if service.cache.enabled { "on" } else { "off" },
        service.cache.storage,
        service.cache.ttl
    );
    println!();

    println!("requests ({}):", cfg.requests.len());
    for planned in &cfg.requests {
        let resolved = ResolvedOptions::resolve(service, &planned.options);
        let mut spec = planned.spec.clone();
        spec.url = resolve_url(service.base_url.as_deref(), &spec.url);

        println!("  - {} {}", spec.method, spec.url);
        println!("      fingerprint: {}", fingerprint(&spec));
        println!("      priority: {}", resolved.priority);
        println!("      duplicate: {:?}", resolved.duplicate);
        if let Some(retry) = &resolved.retry {
            println!("      retry: max_count={} delay={:?} timing={:?}", retry.max_count, retry.delay, retry.timing);
        }
        if let Some(cache) = &resolved.cache {
            println!("      cache: storage={} ttl={:?}", cache.storage, cache.ttl);
        }
    }

    debug!("dry-run complete (nothing sent)");
}
