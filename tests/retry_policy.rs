// tests/retry_policy.rs

use std::time::Duration;

use fetchq::engine::Priority;
use fetchq::errors::{RequestError, TransportError};
use fetchq::service::{
    delay_for, is_retryable_by_default, CacheOption, CacheOverrides, RequestOptions,
    ResolvedOptions, RetryConfig, RetryDecision, RetryOption, RetryOverrides, RetryPhase,
    RetryState, ServiceConfig,
};
use fetchq::transport::Response;
use fetchq::types::{DuplicatePolicy, RetryTiming, StorageKind};

fn status(code: u16) -> RequestError {
    RequestError::HttpStatus {
        status: code,
        response: Box::new(Response::new(code)),
    }
}

fn network() -> RequestError {
    RequestError::Transport(TransportError::Network("reset".into()))
}

fn retry_enabled(max_count: u32) -> ServiceConfig {
    ServiceConfig {
        retry: RetryConfig {
            max_count,
            delay: Duration::from_millis(100),
            timing: RetryTiming::Exponential,
            ..RetryConfig::enabled()
        },
        ..ServiceConfig::default()
    }
}

#[test]
fn exponential_delay_doubles_from_base() {
    let base = Duration::from_millis(100);
    let delays: Vec<u128> = (1..=4)
        .map(|n| delay_for(RetryTiming::Exponential, base, n).as_millis())
        .collect();
    assert_eq!(delays, vec![100, 200, 400, 800]);
}

#[test]
fn linear_delay_is_constant() {
    let base = Duration::from_millis(70);
    for n in 1..=5 {
        assert_eq!(delay_for(RetryTiming::Linear, base, n), base);
    }
}

#[test]
fn exponential_delay_saturates_instead_of_overflowing() {
    let huge = delay_for(RetryTiming::Exponential, Duration::from_secs(u64::MAX / 2), 40);
    assert_eq!(huge, Duration::MAX);
}

#[test]
fn default_classification() {
    assert!(is_retryable_by_default(&network()));
    assert!(is_retryable_by_default(&RequestError::Transport(TransportError::Timeout)));
    assert!(!is_retryable_by_default(&RequestError::Transport(TransportError::Canceled)));

    for code in [500, 502, 503, 504, 408, 429] {
        assert!(is_retryable_by_default(&status(code)), "{code} should retry");
    }
    for code in [400, 401, 403, 404, 409, 422] {
        assert!(!is_retryable_by_default(&status(code)), "{code} should not retry");
    }

    assert!(!is_retryable_by_default(&RequestError::Interceptor("nope".into())));
}

#[test]
fn retry_state_walks_through_phases() {
    let resolved = ResolvedOptions::resolve(&retry_enabled(2), &RequestOptions::new());
    let policy = resolved.retry.as_ref();
    let mut state = RetryState::new();
    assert_eq!(state.phase(), RetryPhase::NotAttempted);

    match state.on_failure(network(), policy) {
        RetryDecision::Retry { attempt, delay } => {
            assert_eq!(attempt, 1);
            assert_eq!(delay, Duration::from_millis(100));
        }
        other => panic!("expected retry, got {other:?}"),
    }
    assert_eq!(state.phase(), RetryPhase::Retrying(1));

    match state.on_failure(status(503), policy) {
        RetryDecision::Retry { attempt, delay } => {
            assert_eq!(attempt, 2);
            assert_eq!(delay, Duration::from_millis(200));
        }
        other => panic!("expected retry, got {other:?}"),
    }

    match state.on_failure(network(), policy) {
        RetryDecision::GiveUp(RequestError::RetryExhausted { retries, .. }) => assert_eq!(retries, 2),
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(state.phase(), RetryPhase::Exhausted);
    assert_eq!(state.attempt(), 2);
}

#[test]
fn success_after_retry_is_recorded() {
    let resolved = ResolvedOptions::resolve(&retry_enabled(3), &RequestOptions::new());
    let mut state = RetryState::new();
    state.on_failure(network(), resolved.retry.as_ref());
    state.on_success();
    assert_eq!(state.phase(), RetryPhase::Succeeded);
    assert_eq!(state.attempt(), 1);
}

#[test]
fn scheduler_decisions_are_never_retried() {
    let resolved = ResolvedOptions::resolve(&retry_enabled(5), &RequestOptions::new());
    let decisions = [
        RequestError::DuplicateRejected { fingerprint: "f".into() },
        RequestError::Superseded { fingerprint: "f".into() },
        RequestError::Canceled { reason: "r".into() },
        RequestError::QueueCleared { reason: "r".into() },
        RequestError::SchedulerClosed,
    ];

    for error in decisions {
        let mut state = RetryState::new();
        assert!(matches!(
            state.on_failure(error, resolved.retry.as_ref()),
            RetryDecision::GiveUp(_)
        ));
        assert_eq!(state.attempt(), 0);
    }
}

#[test]
fn disabled_retry_gives_up_immediately() {
    let mut state = RetryState::new();
    match state.on_failure(network(), None) {
        RetryDecision::GiveUp(RequestError::Transport(_)) => {}
        other => panic!("expected raw error, got {other:?}"),
    }
}

#[test]
fn resolve_prefers_request_over_service() {
    let mut config = ServiceConfig {
        priority: Priority::new(3),
        duplicate: DuplicatePolicy::Link,
        timeout: Some(Duration::from_secs(10)),
        ..retry_enabled(4)
    };
    config.cache.enabled = true;
    config.cache.storage = StorageKind::Session;

    let inherited = ResolvedOptions::resolve(&config, &RequestOptions::new());
    assert_eq!(inherited.priority, Priority::new(3));
    assert_eq!(inherited.duplicate, DuplicatePolicy::Link);
    assert_eq!(inherited.timeout, Some(Duration::from_secs(10)));
    assert_eq!(inherited.retry.as_ref().map(|r| r.max_count), Some(4));
    assert_eq!(inherited.cache.map(|c| c.storage), Some(StorageKind::Session));

    let options = RequestOptions::new()
        .priority(8)
        .duplicate(DuplicatePolicy::RejectNew)
        .timeout(Duration::from_secs(1))
        .retry(RetryOption::Custom(
            RetryOverrides::default().max_count(1).timing(RetryTiming::Linear),
        ))
        .cache(CacheOption::Custom(CacheOverrides {
            storage: Some(StorageKind::Memory),
            ttl: None,
        }));
    let resolved = ResolvedOptions::resolve(&config, &options);

    assert_eq!(resolved.priority, Priority::new(8));
    assert_eq!(resolved.duplicate, DuplicatePolicy::RejectNew);
    assert_eq!(resolved.timeout, Some(Duration::from_secs(1)));

    let retry = resolved.retry.unwrap();
    assert_eq!(retry.max_count, 1);
    assert_eq!(retry.timing, RetryTiming::Linear);
    assert_eq!(retry.delay, Duration::from_millis(100));

    let cache = resolved.cache.unwrap();
    assert_eq!(cache.storage, StorageKind::Memory);
    assert_eq!(cache.ttl, config.cache.ttl);
}

#[test]
fn resolve_respects_explicit_disable() {
    let mut config = retry_enabled(2);
    config.cache.enabled = true;

    let options = RequestOptions::new()
        .retry(RetryOption::Disabled)
        .cache(CacheOption::Disabled);
    let resolved = ResolvedOptions::resolve(&config, &options);
    assert!(resolved.retry.is_none());
    assert!(resolved.cache.is_none());
}

#[test]
fn priority_above_nine_is_clamped() {
    let resolved = ResolvedOptions::resolve(
        &ServiceConfig::default(),
        &RequestOptions::new().priority(200),
    );
    assert_eq!(resolved.priority, Priority::MAX);
}
