//! # Inbound Ports
//!
//! API trait defining what the local client can do.

use crate::domain::ClientError;
use crate::service::EventReceiver;
use async_trait::async_trait;

/// Event subscription API - inbound port.
#[async_trait]
pub trait EventsClient: Send + Sync {
    /// Subscribe `subscriber` to events matching `query`.
    ///
    /// `out_capacity` sizes the delivery queue; `None` uses the configured
    /// default and `Some(0)` selects synchronous handoff.
    async fn subscribe(
        &self,
        subscriber: &str,
        query: &str,
        out_capacity: Option<usize>,
    ) -> Result<EventReceiver, ClientError>;

    /// Stop delivering events for `query` to `subscriber`.
    async fn unsubscribe(&self, subscriber: &str, query: &str) -> Result<(), ClientError>;

    /// Stop every subscription of `subscriber`.
    async fn unsubscribe_all(&self, subscriber: &str) -> Result<(), ClientError>;
}
