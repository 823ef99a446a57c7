// src/engine/runtime.rs

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{RequestError, TransportError};
use crate::request::Fingerprint;
use crate::types::DuplicatePolicy;

use super::core::SchedulerCore;
use super::{
    CoreCommand, CoreStep, Outcome, Priority, SchedulerEvent, SchedulerSnapshot, Submission,
    TaskKey, Work,
};

/// Capacity of the scheduler's event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Drives a [`SchedulerCore`] in response to [`SchedulerEvent`]s and spawns
/// the work it admits.
///
/// This is a pure IO shell: all queueing semantics live in the core. The
/// runtime only holds a weak sender, so it stops once every [`Scheduler`]
/// handle and every piece of in-flight work is gone.
struct SchedulerRuntime<T> {
    core: SchedulerCore<T>,
    event_rx: mpsc::Receiver<SchedulerEvent<T>>,
    event_tx: mpsc::WeakSender<SchedulerEvent<T>>,
}

impl<T: Clone + Send + 'static> SchedulerRuntime<T> {
    /// Main event loop.
    async fn run(mut self) {
        info!(max_concurrent = self.core.max_concurrent(), "scheduler started");

        while let Some(event) = self.event_rx.recv().await {
            debug!(?event, "scheduler received event");
            let step = self.core.step(event);
            self.execute(step);
        }

        info!("scheduler event channel closed; exiting");
    }

    fn execute(&mut self, step: CoreStep<T>) {
        let mut commands: VecDeque<_> = step.commands.into();

        while let Some(command) = commands.pop_front() {
            match command {
                CoreCommand::Start {
                    key,
                    fingerprint,
                    work,
                } => match self.event_tx.upgrade() {
                    Some(tx) => spawn_work(tx, key, fingerprint, work),
                    None => {
                        // Nobody can report the completion; settle it here so
                        // the slot is freed.
                        let step = self.core.complete(key, Err(RequestError::SchedulerClosed));
                        commands.extend(step.commands);
                    }
                },
            }
        }
    }
}

fn spawn_work<T: Send + 'static>(
    tx: mpsc::Sender<SchedulerEvent<T>>,
    key: TaskKey,
    fingerprint: Fingerprint,
    work: Work<T>,
) {
    tokio::spawn(async move {
        let outcome = match tokio::spawn(work()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%key, %fingerprint, error = %e, "work did not run to completion");
                Err(RequestError::Transport(TransportError::Network(format!(
                    "work did not run to completion: {e}"
                ))))
            }
        };

        if tx
            .send(SchedulerEvent::Completed { key, outcome })
            .await
            .is_err()
        {
            debug!(%key, "scheduler stopped; dropping completion");
        }
    });
}

/// Handle to a running scheduler. Cheap to clone; every clone talks to the
/// same queue.
pub struct Scheduler<T> {
    tx: mpsc::Sender<SchedulerEvent<T>>,
    max_concurrent: usize,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            max_concurrent: self.max_concurrent,
        }
    }
}

impl<T> fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Scheduler<T> {
    /// Spawn the scheduler actor on the current Tokio runtime.
    ///
    /// `max_concurrent` below 1 is raised to 1.
    pub fn spawn(max_concurrent: usize) -> Self {
        let core = SchedulerCore::new(max_concurrent);
        let max_concurrent = core.max_concurrent();
        let (tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let runtime = SchedulerRuntime {
            core,
            event_rx,
            event_tx: tx.downgrade(),
        };
        tokio::spawn(runtime.run());

        Self { tx, max_concurrent }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Hand work to the scheduler and return a ticket for its outcome.
    ///
    /// Once this returns, the submission is ordered before any later
    /// `enqueue` from the same task.
    pub async fn enqueue(
        &self,
        fingerprint: impl Into<Fingerprint>,
        priority: Priority,
        policy: DuplicatePolicy,
        cancel: CancellationToken,
        work: Work<T>,
    ) -> Result<Ticket<T>, RequestError> {
        let (submission, rx) = Submission::new(fingerprint, priority, policy, work, cancel);
        self.tx
            .send(SchedulerEvent::Submit(submission))
            .await
            .map_err(|_| RequestError::SchedulerClosed)?;
        Ok(Ticket { rx })
    }

    /// Enqueue and wait for the outcome.
    pub async fn submit(
        &self,
        fingerprint: impl Into<Fingerprint>,
        priority: Priority,
        policy: DuplicatePolicy,
        cancel: CancellationToken,
        work: Work<T>,
    ) -> Outcome<T> {
        self.enqueue(fingerprint, priority, policy, cancel, work)
            .await?
            .await
    }

    /// Cancel every pending or running request with this fingerprint.
    /// Returns how many callers were settled, linked waiters included.
    pub async fn cancel(&self, fingerprint: &str, reason: &str) -> usize {
        self.ask(|reply| SchedulerEvent::Cancel {
            fingerprint: fingerprint.to_string(),
            reason: reason.to_string(),
            reply,
        })
        .await
        .unwrap_or(0)
    }

    /// Clear the pending queue and cancel everything running.
    pub async fn cancel_all(&self, reason: &str) -> usize {
        self.ask(|reply| SchedulerEvent::CancelAll {
            reason: reason.to_string(),
            reply,
        })
        .await
        .unwrap_or(0)
    }

    /// Fail every pending request. Running requests are left alone.
    pub async fn clear(&self, reason: &str) -> usize {
        self.ask(|reply| SchedulerEvent::Clear {
            reason: reason.to_string(),
            reply,
        })
        .await
        .unwrap_or(0)
    }

    pub async fn snapshot(&self) -> Option<SchedulerSnapshot> {
        self.ask(|reply| SchedulerEvent::Snapshot { reply }).await
    }

    async fn ask<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> SchedulerEvent<T>) -> Option<R> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.ok()?;
        rx.await.ok()
    }
}

/// Pending outcome of an enqueued submission.
///
/// Resolves to [`RequestError::SchedulerClosed`] if the scheduler went away
/// before settling it.
#[derive(Debug)]
pub struct Ticket<T> {
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> Future for Ticket<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(RequestError::SchedulerClosed)))
    }
}
