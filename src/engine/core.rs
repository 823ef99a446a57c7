// src/engine/core.rs

//! Pure scheduler state machine.
//!
//! [`SchedulerCore`] consumes [`SchedulerEvent`]s and produces:
//! - an updated pending queue and running set
//! - a list of [`CoreCommand`]s describing which work the IO shell should
//!   start next
//!
//! The async shell ([`crate::engine::runtime`]) is responsible for reading
//! events from the channel, spawning admitted work and reporting completions.
//! The core itself spawns nothing and never awaits, so it can be driven
//! step by step in tests.

use crate::engine::event_handlers::{
    handle_cancel, handle_cancel_all, handle_clear, handle_completion,
    handle_submit, CoreCommand, CoreStep,
};
use crate::engine::queue::PendingQueue;
use crate::engine::{
    Outcome, SchedulerEvent, SchedulerSnapshot, Submission, TaskContext, TaskKey,
};

/// Scheduler state: pending queue, running set and the concurrency bound.
///
/// Invariants:
/// - `running.len() <= max_concurrent` after every step
/// - a context is never both pending and running
#[derive(Debug)]
pub struct SchedulerCore<T> {
    pending: PendingQueue<TaskContext<T>>,
    running: Vec<TaskContext<T>>,
    max_concurrent: usize,
    next_key: u64,
}

impl<T: Clone> SchedulerCore<T> {
    /// `max_concurrent` below 1 is raised to 1.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            pending: PendingQueue::new(),
            running: Vec::new(),
            max_concurrent: max_concurrent.max(1),
            next_key: 0,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn running_len(&self) -> usize {
        self.running.len()
    }

    /// Handle a single event, updating state and returning the commands for
    /// the IO shell. Events that carry a reply channel are answered here.
    pub fn step(&mut self, event: SchedulerEvent<T>) -> CoreStep<T> {
        match event {
            SchedulerEvent::Submit(submission) => self.submit(submission).1,
            SchedulerEvent::Completed { key, outcome } => self.complete(key, outcome),
            SchedulerEvent::Cancel {
                fingerprint,
                reason,
                reply,
            } => {
                let (count, step) = self.cancel(&fingerprint, &reason);
                let _ = reply.send(count);
                step
            }
            SchedulerEvent::CancelAll { reason, reply } => {
                let count = self.cancel_all(&reason);
                let _ = reply.send(count);
                CoreStep::empty()
            }
            SchedulerEvent::Clear { reason, reply } => {
                let count = self.clear(&reason);
                let _ = reply.send(count);
                CoreStep::empty()
            }
            SchedulerEvent::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                CoreStep::empty()
            }
        }
    }

    /// Accept a submission. Returns the key assigned to it along with the
    /// commands to execute.
    pub fn submit(&mut self, submission: Submission<T>) -> (TaskKey, CoreStep<T>) {
        let key = TaskKey(self.next_key);
        self.next_key += 1;
        let step = handle_submit(
            &mut self.pending,
            &mut self.running,
            self.max_concurrent,
            key,
            submission,
        );
        (key, step)
    }

    pub fn complete(&mut self, key: TaskKey, outcome: Outcome<T>) -> CoreStep<T> {
        handle_completion(
            &mut self.pending,
            &mut self.running,
            self.max_concurrent,
            key,
            outcome,
        )
    }

    pub fn cancel(&mut self, fingerprint: &str, reason: &str) -> (usize, CoreStep<T>) {
        handle_cancel(
            &mut self.pending,
            &mut self.running,
            self.max_concurrent,
            fingerprint,
            reason,
        )
    }

    pub fn cancel_all(&mut self, reason: &str) -> usize {
        handle_cancel_all(&mut self.pending, &mut self.running, reason)
    }

    pub fn clear(&mut self, reason: &str) -> usize {
        handle_clear(&mut self.pending, reason)
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let linked = self
            .pending
            .iter()
            .chain(self.running.iter())
            .map(|c| c.links_len())
            .sum();
        SchedulerSnapshot {
            pending: self
                .pending
                .iter()
                .map(|c| (c.id().to_string(), c.priority()))
                .collect(),
            running: self.running.iter().map(|c| c.id().to_string()).collect(),
            linked,
            max_concurrent: self.max_concurrent,
        }
    }
}
