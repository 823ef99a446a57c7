// src/engine/event_handlers.rs

//! Event handling logic for the scheduler core.

use std::fmt;

use tracing::{debug, info, warn};

use crate::errors::RequestError;
use crate::request::Fingerprint;
use crate::types::DuplicatePolicy;

use super::context::TaskContext;
use super::queue::PendingQueue;
use super::{Submission, TaskKey, Work};

/// Command produced by the pure core, to be executed by the outer IO shell.
pub enum CoreCommand<T> {
    /// Run this work; report its outcome back as `Completed { key, .. }`.
    Start {
        key: TaskKey,
        fingerprint: Fingerprint,
        work: Work<T>,
    },
}

impl<T> fmt::Debug for CoreCommand<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreCommand::Start {
                key, fingerprint, ..
            } => f
                .debug_struct("Start")
                .field("key", key)
                .field("fingerprint", fingerprint)
                .finish_non_exhaustive(),
        }
    }
}

/// Decision returned by the core after handling a single event.
#[derive(Debug)]
pub struct CoreStep<T> {
    /// Work the IO shell should start, in admission order.
    pub commands: Vec<CoreCommand<T>>,
}

impl<T> CoreStep<T> {
    pub fn empty() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    pub fn started(&self) -> Vec<TaskKey> {
        self.commands
            .iter()
            .map(|CoreCommand::Start { key, .. }| *key)
            .collect()
    }
}

impl<T> Default for CoreStep<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Find a live context with this fingerprint, preferring running work over
/// pending work.
fn find_live<'a, T>(
    queue: &'a mut PendingQueue<TaskContext<T>>,
    running: &'a mut [TaskContext<T>],
    id: &str,
) -> Option<&'a mut TaskContext<T>> {
    if let Some(context) = running.iter_mut().find(|c| c.id() == id) {
        return Some(context);
    }
    queue.find_mut(|c| c.id() == id)
}

/// Take every running context matching `id` out of `running`.
fn take_running<T>(running: &mut Vec<TaskContext<T>>, id: Option<&str>) -> Vec<TaskContext<T>> {
    let (taken, kept): (Vec<_>, Vec<_>) = running
        .drain(..)
        .partition(|c| id.is_none_or(|id| c.id() == id));
    *running = kept;
    taken
}

/// Handle a new submission according to its duplicate policy, then admit
/// whatever fits.
pub fn handle_submit<T: Clone>(
    queue: &mut PendingQueue<TaskContext<T>>,
    running: &mut Vec<TaskContext<T>>,
    max_concurrent: usize,
    key: TaskKey,
    submission: Submission<T>,
) -> CoreStep<T> {
    let (mut context, policy) = TaskContext::from_submission(key, submission);

    match policy {
        DuplicatePolicy::Allow => {}
        DuplicatePolicy::RejectNew => {
            let duplicate = running.iter().any(|c| c.id() == context.id())
                || queue.contains(|c| c.id() == context.id());
            if duplicate {
                debug!(fingerprint = %context.id(), %key, "duplicate rejected");
                let fingerprint = context.id().to_string();
                context.reject(RequestError::DuplicateRejected { fingerprint });
                return CoreStep::empty();
            }
        }
        DuplicatePolicy::ReplaceOld => {
            let superseded = supersede(queue, running, context.id());
            if superseded > 0 {
                info!(fingerprint = %context.id(), superseded, "replaced older duplicates");
            }
        }
        DuplicatePolicy::Link => {
            if let Some(existing) = find_live(queue, running, context.id()) {
                debug!(
                    fingerprint = %context.id(),
                    %key,
                    target = %existing.key(),
                    "linked onto existing request"
                );
                existing.link(context);
                return CoreStep::empty();
            }
        }
    }

    let priority = context.priority();
    let position = queue.push(context);
    debug!(%key, %priority, position, pending = queue.len(), "queued");

    CoreStep {
        commands: admit_ready(queue, running, max_concurrent),
    }
}

/// Settle every live context with fingerprint `id` as superseded. Running
/// ones are also asked to abort.
fn supersede<T: Clone>(
    queue: &mut PendingQueue<TaskContext<T>>,
    running: &mut Vec<TaskContext<T>>,
    id: &str,
) -> usize {
    let mut count = 0;

    for mut context in take_running(running, Some(id)) {
        context.request_cancel();
        context.reject(RequestError::Superseded {
            fingerprint: id.to_string(),
        });
        count += 1;
    }

    for mut context in queue.remove_where(|c| c.id() == id) {
        context.reject(RequestError::Superseded {
            fingerprint: id.to_string(),
        });
        count += 1;
    }

    count
}

/// Handle finished work: settle its context, free the slot, admit more.
///
/// A completion for a key that is no longer running (because it was
/// cancelled or superseded meanwhile) is ignored.
pub fn handle_completion<T: Clone>(
    queue: &mut PendingQueue<TaskContext<T>>,
    running: &mut Vec<TaskContext<T>>,
    max_concurrent: usize,
    key: TaskKey,
    outcome: Result<T, RequestError>,
) -> CoreStep<T> {
    match running.iter().position(|c| c.key() == key) {
        Some(index) => {
            let mut context = running.remove(index);
            let ok = outcome.is_ok();
            let linked = context.links_len();
            context.settle(outcome);
            debug!(%key, fingerprint = %context.id(), ok, linked, "completed");
        }
        None => {
            debug!(%key, "completion for a task that is no longer running; ignoring");
        }
    }

    CoreStep {
        commands: admit_ready(queue, running, max_concurrent),
    }
}

/// Cancel every pending or running context with fingerprint `id`.
///
/// Pending work is removed without ever running. Running work gets its
/// token cancelled and its slot freed right away.
pub fn handle_cancel<T: Clone>(
    queue: &mut PendingQueue<TaskContext<T>>,
    running: &mut Vec<TaskContext<T>>,
    max_concurrent: usize,
    id: &str,
    reason: &str,
) -> (usize, CoreStep<T>) {
    let mut count = 0;

    for mut context in queue.remove_where(|c| c.id() == id) {
        count += callers(&context);
        context.reject(RequestError::Canceled {
            reason: reason.to_string(),
        });
    }

    for mut context in take_running(running, Some(id)) {
        count += callers(&context);
        context.request_cancel();
        context.reject(RequestError::Canceled {
            reason: reason.to_string(),
        });
    }

    if count > 0 {
        info!(fingerprint = %id, count, reason, "cancelled");
    } else {
        debug!(fingerprint = %id, "cancel matched nothing");
    }

    let step = CoreStep {
        commands: admit_ready(queue, running, max_concurrent),
    };
    (count, step)
}

/// Fail every pending context. Running work is left alone.
pub fn handle_clear<T: Clone>(queue: &mut PendingQueue<TaskContext<T>>, reason: &str) -> usize {
    let cleared = queue.drain_all();
    let count: usize = cleared.iter().map(callers).sum();
    for mut context in cleared {
        context.reject(RequestError::QueueCleared {
            reason: reason.to_string(),
        });
    }
    if count > 0 {
        info!(count, reason, "cleared pending queue");
    }
    count
}

/// Clear the queue, then cancel everything running.
pub fn handle_cancel_all<T: Clone>(
    queue: &mut PendingQueue<TaskContext<T>>,
    running: &mut Vec<TaskContext<T>>,
    reason: &str,
) -> usize {
    let mut count = handle_clear(queue, reason);

    for mut context in take_running(running, None) {
        count += callers(&context);
        context.request_cancel();
        context.reject(RequestError::Canceled {
            reason: reason.to_string(),
        });
    }

    count
}

/// Callers settled by failing `context`: its owner plus every linked waiter.
fn callers<T>(context: &TaskContext<T>) -> usize {
    1 + context.links_len()
}

/// Move pending work into free running slots, highest priority first.
pub fn admit_ready<T: Clone>(
    queue: &mut PendingQueue<TaskContext<T>>,
    running: &mut Vec<TaskContext<T>>,
    max_concurrent: usize,
) -> Vec<CoreCommand<T>> {
    let mut commands = Vec::new();

    while running.len() < max_concurrent {
        let Some(mut context) = queue.pop() else {
            break;
        };

        match context.start() {
            Some(work) => {
                debug!(key = %context.key(), fingerprint = %context.id(), running = running.len() + 1, "started");
                commands.push(CoreCommand::Start {
                    key: context.key(),
                    fingerprint: context.id().to_string(),
                    work,
                });
                running.push(context);
            }
            None => {
                warn!(key = %context.key(), "queued task had no work; dropping");
                context.reject(RequestError::Canceled {
                    reason: "task had no work to run".to_string(),
                });
            }
        }
    }

    commands
}
