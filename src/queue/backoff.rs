//! Retry delay schedule.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Exponential backoff: `base * 2^(retry - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Retried jobs are eligible again immediately.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Delay after the `retry`-th failure (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(30);
        self.base.saturating_mul(1u32 << exp).min(self.max)
    }

    /// The instant a job failing for the `retry`-th time becomes eligible.
    pub fn eligible_at(&self, now: DateTime<Utc>, retry: u32) -> DateTime<Utc> {
        chrono::Duration::from_std(self.delay_for(retry))
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300),
        }
    }
}
