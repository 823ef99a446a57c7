// src/engine/mod.rs

//! Request scheduling engine.
//!
//! This module ties together:
//! - the priority-ordered pending queue ([`queue`])
//! - the task context lifecycle and linked waiters ([`context`])
//! - the duplicate-policy and admission logic ([`event_handlers`])
//!
//! The pure scheduler state machine lives in [`core`]; the async actor that
//! owns it, runs admitted work and feeds completions back in is implemented
//! in [`runtime`]. All queue state is owned by that one actor, so concurrent
//! callers only ever talk to it through events.

use std::fmt;
use std::future::Future;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::errors::RequestError;
use crate::request::Fingerprint;
use crate::transport::BoxFuture;
use crate::types::DuplicatePolicy;

/// Result a task context settles with.
pub type Outcome<T> = Result<T, RequestError>;

/// Zero-argument callable producing the task's outcome. Invoked at most once,
/// and only when the task is admitted to run.
pub type Work<T> = Box<dyn FnOnce() -> BoxFuture<'static, Outcome<T>> + Send>;

/// Box an async closure as [`Work`].
pub fn into_work<T, F, Fut>(f: F) -> Work<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Outcome<T>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// Admission priority, 0 (lowest) to 9 (highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Priority = Priority(0);
    pub const MAX: Priority = Priority(9);
    pub const DEFAULT: Priority = Priority(5);

    /// Values above 9 are clamped to 9.
    pub fn new(value: u8) -> Self {
        Self(value.min(Self::MAX.0))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduler-assigned identity of one submission. Unlike the fingerprint it
/// is unique, even among duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey(pub u64);

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the scheduler needs to admit one unit of work.
pub struct Submission<T> {
    pub fingerprint: Fingerprint,
    pub priority: Priority,
    pub policy: DuplicatePolicy,
    pub work: Work<T>,
    pub cancel: CancellationToken,
    pub responder: oneshot::Sender<Outcome<T>>,
}

impl<T> Submission<T> {
    /// Build a submission plus the receiver its outcome will arrive on.
    pub fn new(
        fingerprint: impl Into<Fingerprint>,
        priority: Priority,
        policy: DuplicatePolicy,
        work: Work<T>,
        cancel: CancellationToken,
    ) -> (Self, oneshot::Receiver<Outcome<T>>) {
        let (responder, rx) = oneshot::channel();
        let submission = Self {
            fingerprint: fingerprint.into(),
            priority,
            policy,
            work,
            cancel,
            responder,
        };
        (submission, rx)
    }
}

impl<T> fmt::Debug for Submission<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("fingerprint", &self.fingerprint)
            .field("priority", &self.priority)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Events flowing into the scheduler actor from callers and running work.
pub enum SchedulerEvent<T> {
    /// A caller submitted work.
    Submit(Submission<T>),
    /// Admitted work finished with a concrete outcome.
    Completed { key: TaskKey, outcome: Outcome<T> },
    /// Cancel every pending or running context with this fingerprint.
    Cancel {
        fingerprint: Fingerprint,
        reason: String,
        reply: oneshot::Sender<usize>,
    },
    /// Clear the pending queue and cancel everything running.
    CancelAll {
        reason: String,
        reply: oneshot::Sender<usize>,
    },
    /// Fail every pending context; running work is untouched.
    Clear {
        reason: String,
        reply: oneshot::Sender<usize>,
    },
    /// Report the current queue state.
    Snapshot { reply: oneshot::Sender<SchedulerSnapshot> },
}

impl<T> fmt::Debug for SchedulerEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerEvent::Submit(submission) => f.debug_tuple("Submit").field(submission).finish(),
            SchedulerEvent::Completed { key, outcome } => f
                .debug_struct("Completed")
                .field("key", key)
                .field("ok", &outcome.is_ok())
                .finish(),
            SchedulerEvent::Cancel {
                fingerprint, reason, ..
            } => f
                .debug_struct("Cancel")
                .field("fingerprint", fingerprint)
                .field("reason", reason)
                .finish(),
            SchedulerEvent::CancelAll { reason, .. } => {
                f.debug_struct("CancelAll").field("reason", reason).finish()
            }
            SchedulerEvent::Clear { reason, .. } => {
                f.debug_struct("Clear").field("reason", reason).finish()
            }
            SchedulerEvent::Snapshot { .. } => f.write_str("Snapshot"),
        }
    }
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchedulerSnapshot {
    /// Pending fingerprints and priorities, in admission order.
    pub pending: Vec<(Fingerprint, Priority)>,
    /// Fingerprints of running contexts.
    pub running: Vec<Fingerprint>,
    /// Waiters linked onto pending or running contexts.
    pub linked: usize,
    pub max_concurrent: usize,
}

pub mod context;
pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;

pub use context::{TaskContext, TaskState};
pub use core::SchedulerCore;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::{PendingQueue, Prioritized};
pub use runtime::{Scheduler, Ticket};
