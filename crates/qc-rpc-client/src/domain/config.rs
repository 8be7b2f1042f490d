//! # Bridge Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `QC_RPC_EVENT_CAPACITY` | `1` | Delivery queue size when the caller gives none (0 = handoff) |
//! | `QC_RPC_BUS_CAPACITY` | `100` | Bus-side buffer per subscription |
//! | `QC_RPC_RESUBSCRIBE_TIMEOUT_MS` | `1000` | Bound on a single resubscribe attempt |
//! | `QC_RPC_HANDOFF_TIMEOUT_MS` | unset | Give up an unclaimed handoff after this long |
//! | `QC_RPC_RETRY_FIRST_MS` | `0` | Delay after the first failed resubscribe |
//! | `QC_RPC_RETRY_MAX_MS` | `30000` | Cap on a single retry delay |
//! | `QC_RPC_RETRY_FACTOR` | `1.0` | Retry delay growth factor |
//! | `QC_RPC_RETRY_JITTER` | `false` | Randomize retry delays |

use super::retry::{RetryPolicy, DEFAULT_RETRY_MAX};
use serde::{Deserialize, Serialize};
use shared_bus::MAX_SUBSCRIPTION_CAPACITY;
use std::env;
use std::time::Duration;

/// Delivery queue size used when the caller does not pick one.
pub const DEFAULT_EVENT_CAPACITY: usize = 1;

/// Per-attempt bound on resubscription.
pub const DEFAULT_RESUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Subscription bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Delivery queue capacity when `subscribe` is called without one.
    /// Zero selects synchronous handoff.
    pub default_out_capacity: usize,

    /// Buffer requested from the bus for each subscription.
    pub bus_capacity: usize,

    /// Bound on a single resubscription attempt.
    pub resubscribe_timeout: Duration,

    /// How long a handoff (capacity 0) waits for the consumer.
    /// `None` waits until the consumer reads or the host shuts down.
    pub handoff_timeout: Option<Duration>,

    /// Delay schedule between failed resubscription attempts.
    pub retry: RetryPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_out_capacity: DEFAULT_EVENT_CAPACITY,
            bus_capacity: shared_bus::DEFAULT_SUBSCRIPTION_CAPACITY,
            resubscribe_timeout: DEFAULT_RESUBSCRIBE_TIMEOUT,
            handoff_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl BridgeConfig {
    /// Create configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_usize = |key: &str| lookup(key).and_then(|v| v.trim().parse::<usize>().ok());
        let parse_ms = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        let defaults = Self::default();
        let retry = RetryPolicy {
            first: parse_ms("QC_RPC_RETRY_FIRST_MS").unwrap_or(defaults.retry.first),
            max: parse_ms("QC_RPC_RETRY_MAX_MS").unwrap_or(DEFAULT_RETRY_MAX),
            factor: lookup("QC_RPC_RETRY_FACTOR")
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|f| f.is_finite() && *f >= 0.0)
                .unwrap_or(defaults.retry.factor),
            jitter: lookup("QC_RPC_RETRY_JITTER")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.retry.jitter),
        };

        Self {
            default_out_capacity: parse_usize("QC_RPC_EVENT_CAPACITY")
                .filter(|c| *c <= MAX_SUBSCRIPTION_CAPACITY)
                .unwrap_or(defaults.default_out_capacity),
            bus_capacity: parse_usize("QC_RPC_BUS_CAPACITY")
                .filter(|c| (1..=MAX_SUBSCRIPTION_CAPACITY).contains(c))
                .unwrap_or(defaults.bus_capacity),
            resubscribe_timeout: parse_ms("QC_RPC_RESUBSCRIBE_TIMEOUT_MS")
                .filter(|t| !t.is_zero())
                .unwrap_or(defaults.resubscribe_timeout),
            handoff_timeout: parse_ms("QC_RPC_HANDOFF_TIMEOUT_MS"),
            retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.default_out_capacity, 1);
        assert_eq!(config.bus_capacity, 100);
        assert_eq!(config.resubscribe_timeout, Duration::from_secs(1));
        assert_eq!(config.handoff_timeout, None);
        assert_eq!(config.retry, RetryPolicy::immediate());
    }

    #[test]
    fn test_empty_lookup_matches_default() {
        assert_eq!(BridgeConfig::from_lookup(|_| None), BridgeConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("QC_RPC_EVENT_CAPACITY", "0"),
            ("QC_RPC_BUS_CAPACITY", "16"),
            ("QC_RPC_RESUBSCRIBE_TIMEOUT_MS", "250"),
            ("QC_RPC_HANDOFF_TIMEOUT_MS", "5000"),
            ("QC_RPC_RETRY_FIRST_MS", "10"),
            ("QC_RPC_RETRY_MAX_MS", "800"),
            ("QC_RPC_RETRY_FACTOR", "2.5"),
            ("QC_RPC_RETRY_JITTER", "TRUE"),
        ]));

        assert_eq!(config.default_out_capacity, 0);
        assert_eq!(config.bus_capacity, 16);
        assert_eq!(config.resubscribe_timeout, Duration::from_millis(250));
        assert_eq!(config.handoff_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.retry.first, Duration::from_millis(10));
        assert_eq!(config.retry.max, Duration::from_millis(800));
        assert!((config.retry.factor - 2.5).abs() < f64::EPSILON);
        assert!(config.retry.jitter);
    }

    #[test]
    fn test_oversized_capacities_fall_back() {
        let huge = usize::MAX.to_string();
        let config = BridgeConfig::from_lookup(lookup(&[
            ("QC_RPC_EVENT_CAPACITY", huge.as_str()),
            ("QC_RPC_BUS_CAPACITY", huge.as_str()),
        ]));
        assert_eq!(config.default_out_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(config.bus_capacity, 100);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("QC_RPC_EVENT_CAPACITY", "lots"),
            ("QC_RPC_BUS_CAPACITY", "0"),
            ("QC_RPC_RESUBSCRIBE_TIMEOUT_MS", "0"),
            ("QC_RPC_RETRY_FACTOR", "-1"),
        ]));

        assert_eq!(config.default_out_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(config.bus_capacity, 100);
        assert_eq!(config.resubscribe_timeout, DEFAULT_RESUBSCRIBE_TIMEOUT);
        assert!((config.retry.factor - 1.0).abs() < f64::EPSILON);
    }
}
