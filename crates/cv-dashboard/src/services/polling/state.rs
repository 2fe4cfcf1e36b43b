use serde::Serialize;
use std::time::Duration;

use super::policy::BackoffPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollOutcome {
    /// Chain still running.
    Pending,
    /// Readiness predicate held.
    Ready,
    /// Retries exhausted; the probe answered but never became ready.
    Degraded,
    /// Retries exhausted; the last probe could not reach the service.
    Down,
}

/// State of one poll chain at a given attempt.
///
/// Each attempt produces a new value from the previous one; nothing is
/// shared between scheduled continuations.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState<T> {
    /// Zero-based index of the latest attempt.
    pub attempt: u32,
    /// Wait before the next retry.
    pub delay: Duration,
    /// Total backoff slept so far.
    pub waited: Duration,
    pub last_result: Option<T>,
    pub outcome: PollOutcome,
}

impl<T> PollState<T> {
    pub fn start(policy: &BackoffPolicy) -> Self {
        Self {
            attempt: 0,
            delay: policy.first_delay(),
            waited: Duration::ZERO,
            last_result: None,
            outcome: PollOutcome::Pending,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome != PollOutcome::Pending
    }

    pub(super) fn with_result(self, result: T) -> Self {
        Self {
            last_result: Some(result),
            ..self
        }
    }

    /// State of the following attempt, after sleeping the current delay.
    pub(super) fn next_attempt(self, policy: &BackoffPolicy) -> Self {
        Self {
            attempt: self.attempt + 1,
            waited: self.waited + self.delay,
            delay: policy.next_delay(self.delay),
            ..self
        }
    }

    pub(super) fn resolve(self, outcome: PollOutcome) -> Self {
        Self { outcome, ..self }
    }
}
