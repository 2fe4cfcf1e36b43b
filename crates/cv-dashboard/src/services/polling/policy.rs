use std::time::Duration;

/// Exponential backoff parameters of a poll chain.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Retries after the first (immediate) attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            backoff_multiplier,
            max_delay,
        }
    }

    /// Wait before the first retry.
    pub fn first_delay(&self) -> Duration {
        self.initial_delay.min(self.max_delay)
    }

    /// Delay applied to the retry after the one waiting `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let scaled_ms = (current.as_millis() as f64 * self.backoff_multiplier).round();
        let scaled = if scaled_ms.is_finite() && scaled_ms > 0.0 {
            Duration::from_millis(scaled_ms as u64)
        } else {
            Duration::ZERO
        };
        scaled.min(self.max_delay)
    }

    /// Full sequence of waits a chain sleeps through when it never succeeds.
    pub fn retry_delays(&self) -> Vec<Duration> {
        std::iter::successors(Some(self.first_delay()), |delay| {
            Some(self.next_delay(*delay))
        })
        .take(self.max_retries as usize)
        .collect()
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(2000),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_millis(10_000),
        }
    }
}
