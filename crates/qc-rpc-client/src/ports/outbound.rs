//! # Outbound Ports
//!
//! The event bus as seen by the subscription bridge.

use async_trait::async_trait;
use shared_bus::{BusError, EventData, Query, Subscription};
use tokio::sync::watch;

/// Event bus - outbound port.
///
/// Subscriptions are keyed by `(subscriber, query)`. A returned
/// [`Subscription`] yields messages and reports its cancellation; an
/// explicit unsubscribe is reported as
/// [`CancelReason::Unsubscribed`](shared_bus::CancelReason::Unsubscribed).
#[async_trait]
pub trait EventBusPort: Send + Sync + 'static {
    /// Open a subscription with a bus-side buffer of `out_capacity`.
    async fn subscribe(
        &self,
        subscriber: &str,
        query: Query,
        out_capacity: usize,
    ) -> Result<Subscription<EventData>, BusError>;

    /// Close the subscription of `subscriber` for `query`.
    async fn unsubscribe(&self, subscriber: &str, query: &Query) -> Result<(), BusError>;

    /// Close every subscription of `subscriber`.
    async fn unsubscribe_all(&self, subscriber: &str) -> Result<(), BusError>;

    /// Whether the bus is still accepting subscriptions.
    fn is_running(&self) -> bool;

    /// Host shutdown signal: observes `true` once, permanently.
    fn quit(&self) -> watch::Receiver<bool>;
}
