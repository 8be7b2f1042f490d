//! Event bus configuration from environment variables.

use std::env;

/// Default maximum number of distinct subscriber identities.
pub const DEFAULT_MAX_CLIENTS: usize = 100;

/// Default maximum number of queries a single subscriber may hold.
pub const DEFAULT_MAX_SUBSCRIPTIONS_PER_CLIENT: usize = 5;

/// Limits enforced by the pub/sub server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Maximum number of distinct subscribers.
    pub max_clients: usize,

    /// Maximum number of subscriptions per subscriber.
    pub max_subscriptions_per_client: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
            max_subscriptions_per_client: DEFAULT_MAX_SUBSCRIPTIONS_PER_CLIENT,
        }
    }
}

impl BusConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QC_BUS_MAX_CLIENTS`: Maximum subscribers (default: 100)
    /// - `QC_BUS_MAX_SUBSCRIPTIONS_PER_CLIENT`: Maximum queries per subscriber (default: 5)
    pub fn from_env() -> Self {
        Self {
            max_clients: env::var("QC_BUS_MAX_CLIENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_CLIENTS),

            max_subscriptions_per_client: env::var("QC_BUS_MAX_SUBSCRIPTIONS_PER_CLIENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_SUBSCRIPTIONS_PER_CLIENT),
        }
    }

    /// Configuration without client or subscription limits.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_clients: usize::MAX,
            max_subscriptions_per_client: usize::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BusConfig::default();
        assert_eq!(config.max_clients, 100);
        assert_eq!(config.max_subscriptions_per_client, 5);
    }

    #[test]
    fn test_unlimited() {
        let config = BusConfig::unlimited();
        assert_eq!(config.max_clients, usize::MAX);
    }
}
