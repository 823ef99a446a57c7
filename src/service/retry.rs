// src/service/retry.rs

//! Retry bookkeeping for one logical request.
//!
//! A [`RetryState`] lives for the whole request, across resubmissions to
//! the scheduler. It never sleeps itself; it only tells the service whether
//! to retry and how long to wait first.

use std::time::Duration;

use tracing::warn;

use crate::errors::{RequestError, TransportError};
use crate::types::RetryTiming;

use super::options::ResolvedRetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    NotAttempted,
    /// Retrying; holds the 1-based number of the retry in progress.
    Retrying(u32),
    Exhausted,
    Succeeded,
}

/// What the service should do after a failed attempt.
#[derive(Debug, Clone)]
pub enum RetryDecision {
    /// Sleep `delay`, then run retry number `attempt`.
    Retry { attempt: u32, delay: Duration },
    /// Stop and hand this error to the caller.
    GiveUp(RequestError),
}

#[derive(Debug, Clone)]
pub struct RetryState {
    attempt: u32,
    phase: RetryPhase,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            phase: RetryPhase::NotAttempted,
        }
    }

    /// Retries performed so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    pub fn on_success(&mut self) {
        self.phase = RetryPhase::Succeeded;
    }

    /// Evaluate a failed attempt.
    ///
    /// `policy` is `None` when retry is disabled for this request. Scheduler
    /// decisions and cancellations are never retried. A retryable error that
    /// has used up `max_count` retries is wrapped in
    /// [`RequestError::RetryExhausted`]; everything else that is given up on
    /// is returned unchanged.
    pub fn on_failure(&mut self, error: RequestError, policy: Option<&ResolvedRetry>) -> RetryDecision {
        let Some(policy) = policy else {
            return RetryDecision::GiveUp(error);
        };

        if error.is_scheduler_decision() || error.is_cancellation() {
            return RetryDecision::GiveUp(error);
        }

        if !policy.accepts(&error, self.attempt) {
            return RetryDecision::GiveUp(error);
        }

        if self.attempt >= policy.max_count {
            self.phase = RetryPhase::Exhausted;
            if self.attempt == 0 {
                // Nothing was retried; there is nothing to wrap.
                return RetryDecision::GiveUp(error);
            }
            warn!(retries = self.attempt, error = %error, "retries exhausted");
            return RetryDecision::GiveUp(RequestError::RetryExhausted {
                retries: self.attempt,
                last: Box::new(error),
            });
        }

        self.attempt += 1;
        self.phase = RetryPhase::Retrying(self.attempt);
        let delay = delay_for(policy.timing, policy.delay, self.attempt);
        warn!(attempt = self.attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying request");
        policy.notify(&error, self.attempt, delay);

        RetryDecision::Retry {
            attempt: self.attempt,
            delay,
        }
    }
}

impl ResolvedRetry {
    /// Whether the predicate chain accepts `error`. Global predicate first,
    /// then the per-request one; both must agree. With neither configured,
    /// [`is_retryable_by_default`] decides.
    pub fn accepts(&self, error: &RequestError, retries: u32) -> bool {
        if self.global_predicate.is_none() && self.request_predicate.is_none() {
            return is_retryable_by_default(error);
        }

        let global_ok = self
            .global_predicate
            .as_ref()
            .is_none_or(|predicate| predicate(error, retries));

        global_ok
            && self
                .request_predicate
                .as_ref()
                .is_none_or(|predicate| predicate(error, retries))
    }

    /// Fire the retry callbacks: per-request first, then global.
    pub fn notify(&self, error: &RequestError, attempt: u32, delay: Duration) {
        if let Some(on_retry) = &self.request_on_retry {
            on_retry(error, attempt, delay);
        }
        if let Some(on_retry) = &self.global_on_retry {
            on_retry(error, attempt, delay);
        }
    }
}

/// Transport failures, 5xx, 408 and 429 are transient. Other statuses and
/// scheduler decisions are not.
pub fn is_retryable_by_default(error: &RequestError) -> bool {
    match error {
        RequestError::Transport(TransportError::Canceled) => false,
        RequestError::Transport(_) => true,
        RequestError::HttpStatus { status, .. } => {
            *status >= 500 || *status == 408 || *status == 429
        }
        _ => false,
    }
}

/// Delay before retry number `attempt` (1-based).
pub fn delay_for(timing: RetryTiming, base: Duration, attempt: u32) -> Duration {
    match timing {
        RetryTiming::Linear => base,
        RetryTiming::Exponential => {
            let exponent = attempt.saturating_sub(1).min(31);
            base.saturating_mul(1u32 << exponent)
        }
    }
}
