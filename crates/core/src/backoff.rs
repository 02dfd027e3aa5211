//! Retry policy with capped exponential backoff.
//!
//! `delay(n) = min(base * 2^n, max)`. Kept free of I/O so the worker can
//! apply it to database rows and tests can check it in isolation.

use std::time::Duration;

/// Default base delay (2 s, 4 s, 8 s, ...).
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(2);

/// Default ceiling for a single retry delay.
pub const DEFAULT_RETRY_MAX: Duration = Duration::from_secs(120);

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
}

/// What to do with a job after a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the job back to `pending`, eligible again after `delay`.
    Reschedule { attempts: i32, delay: Duration },
    /// Give up: the job becomes `failed`.
    Fail { attempts: i32 },
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the next attempt once `attempts` attempts have been made.
    ///
    /// Saturates at `max` instead of overflowing.
    pub fn delay(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Decide the fate of a job that just failed.
    ///
    /// `attempts_before` is the counter stored on the row when it was
    /// claimed; the failed attempt is counted here. Non-retryable failures
    /// fail the job regardless of remaining attempts.
    pub fn decide(&self, attempts_before: i32, max_attempts: i32, retryable: bool) -> RetryDecision {
        let attempts = attempts_before.saturating_add(1);
        if !retryable || attempts >= max_attempts {
            return RetryDecision::Fail { attempts };
        }
        RetryDecision::Reschedule {
            attempts,
            delay: self.delay(u32::try_from(attempts).unwrap_or(0)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BASE, DEFAULT_RETRY_MAX)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
