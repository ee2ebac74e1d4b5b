//! Exponential backoff with jitter.
//!
//! Shared by the REST retry loop and the stream reconnect loop. Each user
//! holds its own policy value, so stream reconnect delay is independent of
//! REST retry delay.

use std::time::Duration;

use rand::Rng;

use super::error::MAX_RETRY_AFTER;

/// Default REST attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default REST base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;

/// Default REST maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 5_000;

/// Default jitter fraction.
pub const DEFAULT_JITTER: f64 = 0.2;

/// Retry policy.
///
/// The delay before retry `n` (the `n`-th failure, 1-based) is drawn from
/// `base * 2^(n-1) * [1 - jitter, 1 + jitter]`, then capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first. `None` means unlimited.
    pub max_attempts: Option<u32>,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound on any computed delay.
    pub max_delay: Duration,

    /// Jitter fraction in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given bounds.
    #[must_use]
    pub fn new(max_attempts: Option<u32>, base_delay: Duration, max_delay: Duration, jitter: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: Some(1),
            ..Self::default()
        }
    }

    /// Returns true if another attempt is allowed after `attempt` attempts.
    #[must_use]
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    /// Returns the undithered delay for retry `attempt`.
    #[must_use]
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
    }

    /// Returns the inclusive bounds a jittered delay for `attempt` falls in.
    #[must_use]
    pub fn delay_bounds(&self, attempt: u32) -> (Duration, Duration) {
        let nominal = self.nominal_delay(attempt).as_secs_f64();
        let lower = Duration::from_secs_f64(nominal * (1.0 - self.jitter));
        let upper = Duration::from_secs_f64(nominal * (1.0 + self.jitter)).min(self.max_delay);
        (lower.min(upper), upper)
    }

    /// Computes the delay before retry `attempt`.
    ///
    /// A server-supplied `retry_after` replaces the computed value, capped
    /// at [`MAX_RETRY_AFTER`].
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(MAX_RETRY_AFTER);
        }

        let (lower, upper) = self.delay_bounds(attempt);
        if upper <= lower {
            return upper;
        }
        let secs = rand::thread_rng().gen_range(lower.as_secs_f64()..=upper.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}
