// tests/scheduler_runtime.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use fetchq::engine::{into_work, Priority, Scheduler};
use fetchq::errors::RequestError;
use fetchq::types::DuplicatePolicy;
use fetchq_test_utils::builders::{gated_work, ready_work};
use fetchq_test_utils::{init_tracing, with_timeout};

fn p(n: u8) -> Priority {
    Priority::new(n)
}

#[tokio::test]
async fn admits_by_priority_once_capacity_frees() {
    init_tracing();
    let scheduler: Scheduler<&'static str> = Scheduler::spawn(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let (started_tx, started_rx) = oneshot::channel();
    let (busy_work, release_busy) = gated_work(Some(started_tx));
    let busy = scheduler
        .enqueue("busy", p(5), DuplicatePolicy::Allow, CancellationToken::new(), busy_work)
        .await
        .unwrap();
    started_rx.await.unwrap();

    let mut tickets = Vec::new();
    for (label, priority) in [("p3", 3), ("p7", 7), ("p5", 5)] {
        let order = Arc::clone(&order);
        let work = into_work(move || async move {
            order.lock().unwrap().push(label);
            Ok(label)
        });
        tickets.push(
            scheduler
                .enqueue(label, p(priority), DuplicatePolicy::Allow, CancellationToken::new(), work)
                .await
                .unwrap(),
        );
    }

    let snapshot = scheduler.snapshot().await.unwrap();
    assert_eq!(snapshot.running, vec!["busy".to_string()]);
    assert_eq!(snapshot.pending.len(), 3);

    release_busy.send(Ok("busy")).unwrap();
    assert_eq!(with_timeout(busy).await.unwrap(), "busy");
    for ticket in tickets {
        with_timeout(ticket).await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec!["p7", "p5", "p3"]);
}

#[tokio::test]
async fn never_runs_more_than_max_concurrent() {
    init_tracing();
    let scheduler: Scheduler<u32> = Scheduler::spawn(2);

    let mut releases = Vec::new();
    let mut tickets = Vec::new();
    for i in 0..5 {
        let (work, release) = gated_work(None);
        releases.push(release);
        tickets.push(
            scheduler
                .enqueue(format!("r{i}"), p(5), DuplicatePolicy::Allow, CancellationToken::new(), work)
                .await
                .unwrap(),
        );
    }

    let snapshot = scheduler.snapshot().await.unwrap();
    assert_eq!(snapshot.running.len(), 2);
    assert_eq!(snapshot.pending.len(), 3);
    assert_eq!(snapshot.max_concurrent, 2);

    for (i, release) in releases.into_iter().enumerate() {
        release.send(Ok(i as u32)).unwrap();
        let snapshot = scheduler.snapshot().await.unwrap();
        assert!(snapshot.running.len() <= 2);
    }

    for (i, ticket) in tickets.into_iter().enumerate() {
        assert_eq!(with_timeout(ticket).await.unwrap(), i as u32);
    }
}

#[tokio::test]
async fn cancelled_pending_work_is_never_invoked() {
    init_tracing();
    let scheduler: Scheduler<u32> = Scheduler::spawn(1);

    let (busy_work, release_busy) = gated_work(None);
    let busy = scheduler
        .enqueue("busy", p(5), DuplicatePolicy::Allow, CancellationToken::new(), busy_work)
        .await
        .unwrap();

    let invoked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&invoked);
    let victim = scheduler
        .enqueue(
            "victim",
            p(5),
            DuplicatePolicy::Allow,
            CancellationToken::new(),
            into_work(move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(1)
            }),
        )
        .await
        .unwrap();

    assert_eq!(scheduler.cancel("victim", "not needed").await, 1);
    assert!(matches!(
        with_timeout(victim).await,
        Err(RequestError::Canceled { .. })
    ));

    release_busy.send(Ok(0)).unwrap();
    with_timeout(busy).await.unwrap();

    let snapshot = scheduler.snapshot().await.unwrap();
    assert!(snapshot.running.is_empty() && snapshot.pending.is_empty());
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancelling_running_work_frees_its_slot() {
    init_tracing();
    let scheduler: Scheduler<u32> = Scheduler::spawn(1);

    let (started_tx, started_rx) = oneshot::channel();
    let (stuck_work, _never_released) = gated_work(Some(started_tx));
    let token = CancellationToken::new();
    let stuck = scheduler
        .enqueue("stuck", p(5), DuplicatePolicy::Allow, token.clone(), stuck_work)
        .await
        .unwrap();
    started_rx.await.unwrap();

    let next = scheduler
        .enqueue("next", p(5), DuplicatePolicy::Allow, CancellationToken::new(), ready_work(2))
        .await
        .unwrap();

    assert_eq!(scheduler.cancel("stuck", "too slow").await, 1);
    assert!(token.is_cancelled());
    assert!(matches!(
        with_timeout(stuck).await,
        Err(RequestError::Canceled { .. })
    ));
    assert_eq!(with_timeout(next).await.unwrap(), 2);
}

#[tokio::test]
async fn link_policy_returns_same_value_to_both_callers() {
    init_tracing();
    let scheduler: Scheduler<u32> = Scheduler::spawn(4);

    let (work, release) = gated_work(None);
    let first = scheduler
        .enqueue("same", p(5), DuplicatePolicy::Allow, CancellationToken::new(), work)
        .await
        .unwrap();

    let invoked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&invoked);
    let second = scheduler
        .enqueue(
            "same",
            p(5),
            DuplicatePolicy::Link,
            CancellationToken::new(),
            into_work(move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(0)
            }),
        )
        .await
        .unwrap();

    assert_eq!(scheduler.snapshot().await.unwrap().linked, 1);
    release.send(Ok(11)).unwrap();

    assert_eq!(with_timeout(first).await.unwrap(), 11);
    assert_eq!(with_timeout(second).await.unwrap(), 11);
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn clear_and_cancel_all_report_counts() {
    init_tracing();
    let scheduler: Scheduler<u32> = Scheduler::spawn(1);

    let (work, _release) = gated_work(None);
    let running = scheduler
        .enqueue("running", p(5), DuplicatePolicy::Allow, CancellationToken::new(), work)
        .await
        .unwrap();
    let queued = scheduler
        .enqueue("queued", p(5), DuplicatePolicy::Allow, CancellationToken::new(), ready_work(1))
        .await
        .unwrap();

    assert_eq!(scheduler.clear("reset").await, 1);
    assert!(matches!(
        with_timeout(queued).await,
        Err(RequestError::QueueCleared { .. })
    ));

    assert_eq!(scheduler.cancel_all("shutdown").await, 1);
    assert!(matches!(
        with_timeout(running).await,
        Err(RequestError::Canceled { .. })
    ));
}

#[tokio::test]
async fn submit_waits_for_outcome() {
    init_tracing();
    let scheduler: Scheduler<u32> = Scheduler::spawn(3);
    let value = scheduler
        .submit("x", p(5), DuplicatePolicy::Allow, CancellationToken::new(), ready_work(9))
        .await
        .unwrap();
    assert_eq!(value, 9);
    assert_eq!(scheduler.max_concurrent(), 3);
}
