//! Bounded retry with backoff for transport failures.
//!
//! Each streaming worker carries a [`RetryBudget`] built from the engine's
//! [`RetryPolicy`]. A failed transport call asks the budget for the next
//! backoff delay; once the budget is exhausted the worker stops and marks
//! its direction as failed. A successful call resets the budget.

use std::time::Duration;

/// Retry policy: how many consecutive failures are tolerated and how long to
/// back off between them.
///
/// The delay before retry `n` (1-based) is
/// `initial_backoff * multiplier^(n-1)`, capped at `max_backoff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before giving up. `0` fails on the
    /// first error.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Growth factor between retries.
    pub multiplier: u32,
    /// Upper bound on a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(20),
            multiplier: 2,
            max_backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Backoff before retry `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.max(1).saturating_pow(attempt - 1);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// A fresh budget following this policy.
    pub fn budget(&self) -> RetryBudget {
        RetryBudget {
            policy: self.clone(),
            failures: 0,
        }
    }
}

/// Consecutive-failure tracker for one worker.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryBudget {
    /// Record a failure.
    ///
    /// Returns the delay to wait before retrying, or `None` when the budget
    /// is exhausted.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures > self.policy.max_retries {
            None
        } else {
            Some(self.policy.backoff(self.failures))
        }
    }

    /// Record a success, restoring the full budget.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
