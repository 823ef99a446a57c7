// src/engine/context.rs

//! Task contexts: one queued or in-flight unit of work and the callers
//! waiting on it.

use std::fmt;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::errors::RequestError;
use crate::request::Fingerprint;
use crate::types::DuplicatePolicy;

use super::queue::Prioritized;
use super::{Outcome, Priority, Submission, TaskKey, Work};

/// Lifecycle of a context. Moves forward only: `Queued → Running → Settled`,
/// or straight from `Queued` to `Settled` when cancelled before it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Settled,
}

/// One unit of schedulable work.
///
/// A context exclusively owns its linked waiters. Settling drains them in the
/// same call, so nothing can be linked or notified twice.
pub struct TaskContext<T> {
    key: TaskKey,
    id: Fingerprint,
    priority: Priority,
    state: TaskState,
    work: Option<Work<T>>,
    cancel: CancellationToken,
    responder: Option<oneshot::Sender<Outcome<T>>>,
    links: Vec<TaskContext<T>>,
}

impl<T> TaskContext<T> {
    pub fn new(
        key: TaskKey,
        id: impl Into<Fingerprint>,
        priority: Priority,
        work: Work<T>,
        cancel: CancellationToken,
        responder: oneshot::Sender<Outcome<T>>,
    ) -> Self {
        Self {
            key,
            id: id.into(),
            priority,
            state: TaskState::Queued,
            work: Some(work),
            cancel,
            responder: Some(responder),
            links: Vec::new(),
        }
    }

    /// Turn a submission into a queued context, returning the duplicate
    /// policy it asked for alongside.
    pub fn from_submission(key: TaskKey, submission: Submission<T>) -> (Self, DuplicatePolicy) {
        let Submission {
            fingerprint,
            priority,
            policy,
            work,
            cancel,
            responder,
        } = submission;
        let context = Self::new(key, fingerprint, priority, work, cancel, responder);
        (context, policy)
    }

    pub fn key(&self) -> TaskKey {
        self.key
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_settled(&self) -> bool {
        self.state == TaskState::Settled
    }

    /// Number of waiters linked onto this context.
    pub fn links_len(&self) -> usize {
        self.links.len()
    }

    /// Move `Queued → Running` and hand out the work to execute.
    ///
    /// Returns `None` if the context is not queued.
    pub fn start(&mut self) -> Option<Work<T>> {
        if self.state != TaskState::Queued {
            return None;
        }
        self.state = TaskState::Running;
        self.work.take()
    }

    /// Attach another caller that should receive this context's outcome.
    /// The waiter's own work is never run.
    pub fn link(&mut self, mut waiter: TaskContext<T>) {
        waiter.work = None;
        self.links.push(waiter);
    }

    /// Signal the in-flight transport call to abort.
    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T: Clone> TaskContext<T> {
    /// Settle with `outcome`, then propagate it to every linked waiter.
    ///
    /// Only the first call has an effect; it returns `true`. Later calls
    /// return `false` and notify no one.
    pub fn settle(&mut self, outcome: Outcome<T>) -> bool {
        if self.state == TaskState::Settled {
            return false;
        }
        self.state = TaskState::Settled;
        self.work = None;

        let links = std::mem::take(&mut self.links);

        if let Some(responder) = self.responder.take() {
            // The caller may have stopped waiting; that is fine.
            let _ = responder.send(outcome.clone());
        }
        for mut link in links {
            link.settle(outcome.clone());
        }

        true
    }

    pub fn resolve(&mut self, value: T) -> bool {
        self.settle(Ok(value))
    }

    pub fn reject(&mut self, error: RequestError) -> bool {
        self.settle(Err(error))
    }
}

impl<T> Prioritized for TaskContext<T> {
    fn priority(&self) -> Priority {
        self.priority
    }
}

impl<T> fmt::Debug for TaskContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("state", &self.state)
            .field("links", &self.links.len())
            .finish()
    }
}
