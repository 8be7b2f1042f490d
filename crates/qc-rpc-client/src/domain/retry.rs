//! # Resubscription retry policy
//!
//! The delay before retry `n` is `first × factor^n`, clamped to `max`.
//! With jitter enabled the delay is drawn uniformly from `[0, base]`; the
//! base is derived from the attempt number alone, so jitter never feeds
//! back into later delays.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default cap on a single retry delay.
pub const DEFAULT_RETRY_MAX: Duration = Duration::from_secs(30);

/// Delay schedule between failed resubscription attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt.
    pub first: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Multiplicative growth per attempt.
    pub factor: f64,
    /// Draw each delay uniformly from `[0, base]`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// Immediate retry: every delay is zero.
    fn default() -> Self {
        Self::immediate()
    }
}

impl RetryPolicy {
    /// Retry without waiting.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            first: Duration::ZERO,
            max: DEFAULT_RETRY_MAX,
            factor: 1.0,
            jitter: false,
        }
    }

    /// Constant delay between attempts.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: false,
        }
    }

    /// Doubling delay from `first` up to `max`, with full jitter.
    #[must_use]
    pub fn exponential(first: Duration, max: Duration) -> Self {
        Self {
            first,
            max,
            factor: 2.0,
            jitter: true,
        }
    }

    /// Delay before retrying after failed attempt number `attempt` (0-indexed).
    #[must_use]
    pub fn next(&self, attempt: u32) -> Duration {
        let base = self.base(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let secs = rand::thread_rng().gen_range(0.0..=base.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    fn base(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_immediate() {
        let policy = RetryPolicy::default();
        for attempt in 0..100 {
            assert_eq!(policy.next(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(Duration::from_millis(250));
        assert_eq!(policy.next(0), Duration::from_millis(250));
        assert_eq!(policy.next(7), Duration::from_millis(250));
    }

    #[test]
    fn test_growth_is_capped() {
        let policy = RetryPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(1),
            factor: 2.0,
            jitter: false,
        };
        assert_eq!(policy.next(0), Duration::from_millis(100));
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(3), Duration::from_millis(800));
        assert_eq!(policy.next(4), Duration::from_secs(1));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_below_base() {
        let policy = RetryPolicy::exponential(Duration::from_millis(10), Duration::from_secs(5));
        for attempt in 0..20 {
            let base = policy.base(attempt);
            assert!(policy.next(attempt) <= base, "attempt {attempt}");
        }
    }

    #[test]
    fn test_first_above_max_clamps() {
        let policy = RetryPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(2),
            factor: 1.0,
            jitter: false,
        };
        assert_eq!(policy.next(0), Duration::from_secs(2));
    }
}
