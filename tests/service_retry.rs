// tests/service_retry.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fetchq::errors::{RequestError, TransportError};
use fetchq::service::{RequestOptions, RetryConfig, RetryOption, RetryOverrides};
use fetchq::types::RetryTiming;
use fetchq_test_utils::builders::{service, ServiceConfigBuilder};
use fetchq_test_utils::{init_tracing, wait_until, with_timeout, FakeTransport};

const URL: &str = "http://api.test/flaky";

fn network(msg: &str) -> TransportError {
    TransportError::Network(msg.to_string())
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn gaps(transport: &FakeTransport) -> Vec<Duration> {
    transport
        .calls()
        .windows(2)
        .map(|w| w[1].at - w[0].at)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn exponential_backoff_doubles_each_delay() {
    init_tracing();
    let transport = FakeTransport::new();
    transport.fail(URL, network("reset"), 3);
    let config = ServiceConfigBuilder::new()
        .retry(3, ms(100), RetryTiming::Exponential)
        .build();
    let svc = service(transport.clone(), config, None);

    let response = with_timeout(svc.get(URL, RequestOptions::new())).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(transport.call_count(), 4);
    assert_eq!(gaps(&transport), vec![ms(100), ms(200), ms(400)]);
}

#[tokio::test(start_paused = true)]
async fn linear_backoff_keeps_delay_constant() {
    init_tracing();
    let transport = FakeTransport::new();
    transport.fail(URL, network("reset"), 2);
    let config = ServiceConfigBuilder::new()
        .retry(2, ms(50), RetryTiming::Linear)
        .build();
    let svc = service(transport.clone(), config, None);

    with_timeout(svc.get(URL, RequestOptions::new())).await.unwrap();
    assert_eq!(gaps(&transport), vec![ms(50), ms(50)]);
}

#[tokio::test(start_paused = true)]
async fn exhausting_retries_wraps_the_last_error() {
    init_tracing();
    let transport = FakeTransport::new();
    transport.fail(URL, network("down"), 3);
    let config = ServiceConfigBuilder::new()
        .retry(2, ms(10), RetryTiming::Linear)
        .build();
    let svc = service(transport.clone(), config, None);

    let err = with_timeout(svc.get(URL, RequestOptions::new()))
        .await
        .unwrap_err();

    match err {
        RequestError::RetryExhausted { retries, last } => {
            assert_eq!(retries, 2);
            assert!(matches!(*last, RequestError::Transport(TransportError::Network(_))));
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn server_errors_are_retried_client_errors_are_not() {
    init_tracing();
    let transport = FakeTransport::new();
    transport.respond_status(URL, 503, 1);
    transport.respond_status("http://api.test/missing", 404, 1);
    let config = ServiceConfigBuilder::new()
        .retry(2, ms(10), RetryTiming::Linear)
        .build();
    let svc = service(transport.clone(), config, None);

    let ok = with_timeout(svc.get(URL, RequestOptions::new())).await;
    assert_eq!(ok.unwrap().status, 200);
    assert_eq!(transport.calls_to(URL), 2);

    let missing = with_timeout(svc.get("http://api.test/missing", RequestOptions::new())).await;
    match missing {
        Err(RequestError::HttpStatus { status, response }) => {
            assert_eq!(status, 404);
            assert_eq!(response.status, 404);
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
    assert_eq!(transport.calls_to("http://api.test/missing"), 1);
}

#[tokio::test(start_paused = true)]
async fn too_many_requests_is_retried() {
    init_tracing();
    let transport = FakeTransport::new();
    transport.respond_status(URL, 429, 1);
    let config = ServiceConfigBuilder::new()
        .retry(1, ms(10), RetryTiming::Linear)
        .build();
    let svc = service(transport.clone(), config, None);

    assert!(with_timeout(svc.get(URL, RequestOptions::new())).await.is_ok());
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn per_request_disable_overrides_service_retry() {
    init_tracing();
    let transport = FakeTransport::new();
    transport.fail(URL, network("once"), 1);
    let config = ServiceConfigBuilder::new()
        .retry(3, ms(10), RetryTiming::Linear)
        .build();
    let svc = service(transport.clone(), config, None);

    let err = with_timeout(svc.get(URL, RequestOptions::new().retry(RetryOption::Disabled)))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Transport(TransportError::Network(_))));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn per_request_enable_uses_service_settings() {
    init_tracing();
    let transport = FakeTransport::new();
    transport.fail(URL, network("once"), 1);
    let svc = service(transport.clone(), ServiceConfigBuilder::new().build(), None);

    let response = with_timeout(svc.get(URL, RequestOptions::new().retry(RetryOption::Enabled))).await;
    assert!(response.is_ok());
    // Default delay is 500ms.
    assert_eq!(gaps(&transport), vec![ms(500)]);
}

#[tokio::test(start_paused = true)]
async fn zero_max_count_returns_error_unwrapped() {
    init_tracing();
    let transport = FakeTransport::new();
    transport.fail(URL, network("nope"), 1);
    let svc = service(transport.clone(), ServiceConfigBuilder::new().build(), None);

    let options = RequestOptions::new().retry(RetryOption::Custom(RetryOverrides::default().max_count(0)));
    let err = with_timeout(svc.get(URL, options)).await.unwrap_err();
    assert!(matches!(err, RequestError::Transport(TransportError::Network(_))));
}

#[tokio::test(start_paused = true)]
async fn global_predicate_runs_before_request_predicate_and_both_must_accept() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));

    let global_log = Arc::clone(&log);
    let retry = RetryConfig::enabled().predicate(move |_, retries| {
        global_log.lock().unwrap().push(format!("global:{retries}"));
        true
    });
    let config = ServiceConfigBuilder::new().retry_config(retry).build();

    let transport = FakeTransport::new();
    transport.respond_status(URL, 500, 1);
    let svc = service(transport.clone(), config, None);

    let request_log = Arc::clone(&log);
    let overrides = RetryOverrides::default().predicate(move |_, retries| {
        request_log.lock().unwrap().push(format!("request:{retries}"));
        false
    });
    let err = with_timeout(svc.get(URL, RequestOptions::new().retry(RetryOption::Custom(overrides))))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(matches!(err, RequestError::HttpStatus { .. }));
    assert_eq!(transport.call_count(), 1);
    assert_eq!(*log.lock().unwrap(), vec!["global:0", "request:0"]);
}

#[tokio::test(start_paused = true)]
async fn configured_predicate_replaces_default_classification() {
    init_tracing();
    let transport = FakeTransport::new();
    transport.respond_status(URL, 404, 1);
    let retry = RetryConfig::enabled().predicate(|err, _| err.status() == Some(404));
    let config = ServiceConfigBuilder::new().retry_config(retry).build();
    let svc = service(transport.clone(), config, None);

    assert!(with_timeout(svc.get(URL, RequestOptions::new())).await.is_ok());
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn on_retry_fires_request_callback_then_global() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));

    let global_log = Arc::clone(&log);
    let retry = RetryConfig {
        delay: ms(20),
        timing: RetryTiming::Exponential,
        ..RetryConfig::enabled()
    }
    .on_retry(move |_, attempt, delay| {
        global_log
            .lock()
            .unwrap()
            .push(format!("global:{attempt}:{}", delay.as_millis()));
    });
    let config = ServiceConfigBuilder::new().retry_config(retry).build();

    let transport = FakeTransport::new();
    transport.fail(URL, network("x"), 2);
    let svc = service(transport.clone(), config, None);

    let request_log = Arc::clone(&log);
    let overrides = RetryOverrides::default().on_retry(move |_, attempt, delay| {
        request_log
            .lock()
            .unwrap()
            .push(format!("request:{attempt}:{}", delay.as_millis()));
    });
    with_timeout(svc.get(URL, RequestOptions::new().retry(RetryOption::Custom(overrides))))
        .await
        .unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["request:1:20", "global:1:20", "request:2:40", "global:2:40"]
    );
}

#[tokio::test]
async fn cancellation_is_never_retried() {
    init_tracing();
    let transport = FakeTransport::held();
    let config = ServiceConfigBuilder::new()
        .retry(5, ms(1), RetryTiming::Linear)
        .build();
    let svc = service(transport.clone(), config, None);
    let spec = fetchq::request::RequestSpec::get(URL);
    let id = svc.fingerprint(&spec);

    let request = svc.request(spec, RequestOptions::new());
    let cancel = async {
        wait_until(|| transport.call_count() == 1).await;
        svc.cancel(&id, Some("user gave up")).await
    };

    let (outcome, canceled) = with_timeout(async { tokio::join!(request, cancel) }).await;

    assert_eq!(canceled, 1);
    match outcome {
        Err(RequestError::Canceled { reason }) => assert_eq!(reason, "user gave up"),
        other => panic!("expected Canceled, got {other:?}"),
    }
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_all_reaches_requests_waiting_to_retry() {
    init_tracing();
    let transport = FakeTransport::new();
    transport.fail(URL, network("reset"), 1);
    let config = ServiceConfigBuilder::new()
        .retry(3, Duration::from_secs(10), RetryTiming::Linear)
        .build();
    let svc = service(transport.clone(), config, None);

    let request = svc.get(URL, RequestOptions::new());
    let cancel = async {
        wait_until(|| svc.backing_off() == 1).await;
        svc.cancel_all(Some("interrupted")).await
    };

    let (outcome, canceled) = with_timeout(async { tokio::join!(request, cancel) }).await;

    assert_eq!(canceled, 1);
    match outcome {
        Err(RequestError::Canceled { reason }) => assert_eq!(reason, "interrupted"),
        other => panic!("expected Canceled, got {other:?}"),
    }
    assert_eq!(transport.call_count(), 1);
    assert_eq!(svc.backing_off(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_by_fingerprint_stops_only_that_backoff() {
    init_tracing();
    let other = "http://api.test/other";
    let transport = FakeTransport::new();
    transport.fail(URL, network("reset"), 1);
    transport.fail(other, network("reset"), 1);
    let config = ServiceConfigBuilder::new()
        .retry(1, ms(500), RetryTiming::Linear)
        .build();
    let svc = service(transport.clone(), config, None);
    let id = svc.fingerprint(&fetchq::request::RequestSpec::get(URL));

    let first = svc.get(URL, RequestOptions::new());
    let second = svc.get(other, RequestOptions::new());
    let cancel = async {
        wait_until(|| svc.backing_off() == 2).await;
        svc.cancel(&id, None).await
    };

    let (first, second, canceled) =
        with_timeout(async { tokio::join!(first, second, cancel) }).await;

    assert_eq!(canceled, 1);
    match first {
        Err(RequestError::Canceled { reason }) => assert_eq!(reason, "canceled by caller"),
        other => panic!("expected Canceled, got {other:?}"),
    }
    assert_eq!(second.unwrap().status, 200);
    assert_eq!(transport.calls_to(URL), 1);
    assert_eq!(transport.calls_to(other), 2);
}
