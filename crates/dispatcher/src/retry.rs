//! Retry Policy
//!
//! Pure decision function: given the error from a send and the number of the
//! attempt about to be made, either wait and retry or abort.

use std::time::Duration;

use contracts::{DeliveryError, PipelineSettings};

/// What to do after a failed send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then send again
    Retry(Duration),
    /// Give up on this message
    Abort,
}

/// Backoff before retry number `attempt` (1-based)
///
/// `base * 2^(attempt-1)`, saturating. Attempt 0 is the initial send and is
/// never delayed.
pub fn backoff(attempt: u32, base: Duration) -> Duration {
    match attempt {
        0 => Duration::ZERO,
        n => base.saturating_mul(2u32.saturating_pow(n - 1)),
    }
}

/// Decide whether retry number `attempt` should happen
pub fn decide(
    error: &DeliveryError,
    attempt: u32,
    max_retries: u32,
    base: Duration,
) -> RetryDecision {
    if !error.is_retriable() || attempt > max_retries {
        return RetryDecision::Abort;
    }
    RetryDecision::Retry(backoff(attempt, base))
}

/// Retry settings bound together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.max_retries, settings.base_backoff())
    }

    pub fn decide(&self, error: &DeliveryError, attempt: u32) -> RetryDecision {
        decide(error, attempt, self.max_retries, self.base_backoff)
    }

    /// Sum of every backoff when all retries are used
    pub fn worst_case_delay(&self) -> Duration {
        (1..=self.max_retries)
            .map(|n| backoff(n, self.base_backoff))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}
