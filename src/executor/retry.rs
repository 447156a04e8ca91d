//! Retry policy and per-call retry bookkeeping

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::neo4j::ErrorClass;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY_MS: u64 = 100;
const DEFAULT_MAX_DELAY_MS: u64 = 5_000;

/// Bounds on how often and how slowly a transaction is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay before retrying a write conflict after `attempt` (1-based) failed.
    ///
    /// `min(base * 2^(attempt-1) + jitter, max_delay)` where
    /// `jitter = base * jitter_fraction` and `jitter_fraction` is in `[0, 1)`.
    pub fn conflict_backoff(&self, attempt: u32, jitter_fraction: f64) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let shift = attempt.saturating_sub(1).min(20);
        let exp_ms = base_ms.saturating_mul(1_u64 << shift);
        let jitter_ms = (base_ms as f64 * jitter_fraction.clamp(0.0, 1.0)) as u64;
        let cap_ms = self.max_delay.as_millis() as u64;
        Duration::from_millis(exp_ms.saturating_add(jitter_ms).min(cap_ms))
    }

    /// Delay before the next attempt for an error of `class`, or `None` when
    /// the error must not be retried.
    pub fn delay_for(&self, class: ErrorClass, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        match class {
            ErrorClass::Unavailable => Some(Duration::ZERO),
            ErrorClass::WriteConflict => {
                Some(self.conflict_backoff(attempt, rand::random::<f64>()))
            }
            ErrorClass::Transient | ErrorClass::Fatal => None,
        }
    }
}

/// Progress of one `execute` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub last_class: Option<ErrorClass>,
    pub next_delay: Duration,
}
