//! # Client Errors

use shared_bus::{BusError, QueryError, MAX_SUBSCRIPTION_CAPACITY};
use thiserror::Error;

/// Errors returned synchronously by the local client.
///
/// Faults inside a running delivery task are never reported here; the
/// task logs them and retries or stops on its own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The query string did not parse. The bus was not contacted.
    #[error("failed to parse query: {0}")]
    InvalidQuery(#[from] QueryError),

    /// A delivery or bus buffer size is out of range. The bus was not
    /// contacted.
    #[error("invalid capacity {0}: must be at most {max}", max = MAX_SUBSCRIPTION_CAPACITY)]
    InvalidCapacity(usize),

    /// The bus rejected the subscription.
    #[error("failed to subscribe: {0}")]
    Subscription(BusError),

    /// The bus rejected the unsubscribe request.
    #[error("failed to unsubscribe: {0}")]
    Unsubscribe(BusError),
}

impl ClientError {
    /// The underlying bus error, if the bus was involved.
    #[must_use]
    pub fn bus_error(&self) -> Option<&BusError> {
        match self {
            Self::InvalidQuery(_) | Self::InvalidCapacity(_) => None,
            Self::Subscription(e) | Self::Unsubscribe(e) => Some(e),
        }
    }
}
