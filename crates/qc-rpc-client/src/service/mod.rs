//! # Local Client Service
//!
//! [`LocalClient`] turns bus subscriptions into [`EventReceiver`]s, one
//! delivery task per subscription.

mod delivery;
mod receiver;
mod stats;

pub use delivery::StopReason;
pub use receiver::EventReceiver;
pub use stats::DeliveryStatsSnapshot;

use crate::domain::{BridgeConfig, ClientError};
use crate::ports::{EventBusPort, EventsClient};
use async_trait::async_trait;
use delivery::DeliveryTask;
use shared_bus::{Query, MAX_SUBSCRIPTION_CAPACITY};
use stats::DeliveryStats;
use std::sync::Arc;
use tracing::{debug, instrument};

/// In-process RPC client for event subscriptions.
///
/// Holds an explicit bus reference; any number of clients may share one
/// bus. Cloning is cheap and clones share their delivery counters.
pub struct LocalClient<B: EventBusPort> {
    bus: Arc<B>,
    config: BridgeConfig,
    stats: Arc<DeliveryStats>,
}

impl<B: EventBusPort> Clone for LocalClient<B> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<B: EventBusPort> LocalClient<B> {
    /// Create a client with default configuration.
    pub fn new(bus: Arc<B>) -> Self {
        Self::with_config(bus, BridgeConfig::default())
    }

    /// Create a client with explicit configuration.
    pub fn with_config(bus: Arc<B>, config: BridgeConfig) -> Self {
        Self {
            bus,
            config,
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    /// Subscribe `subscriber` to events matching `query`.
    ///
    /// Returns as soon as the bus accepted the subscription; events then
    /// arrive on the returned receiver. `out_capacity` sizes the queue
    /// (`None` = configured default, `Some(0)` = synchronous handoff).
    /// When the queue is full, new events are dropped and logged.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidQuery`] if `query` does not parse (the bus is not contacted)
    /// - [`ClientError::InvalidCapacity`] if the delivery queue or the configured bus
    ///   buffer exceeds [`MAX_SUBSCRIPTION_CAPACITY`] (the bus is not contacted)
    /// - [`ClientError::Subscription`] if the bus rejects the subscription
    #[instrument(skip(self), level = "debug")]
    pub async fn subscribe(
        &self,
        subscriber: &str,
        query: &str,
        out_capacity: Option<usize>,
    ) -> Result<EventReceiver, ClientError> {
        let query = Query::parse(query)?;
        let capacity = out_capacity.unwrap_or(self.config.default_out_capacity);
        if capacity > MAX_SUBSCRIPTION_CAPACITY {
            return Err(ClientError::InvalidCapacity(capacity));
        }
        let bus_capacity = self.config.bus_capacity;
        if bus_capacity == 0 || bus_capacity > MAX_SUBSCRIPTION_CAPACITY {
            return Err(ClientError::InvalidCapacity(bus_capacity));
        }

        let subscription = self
            .bus
            .subscribe(subscriber, query.clone(), bus_capacity)
            .await
            .map_err(ClientError::Subscription)?;

        let (out, receiver) = EventReceiver::channel(capacity);
        let task = DeliveryTask::new(
            Arc::clone(&self.bus),
            subscriber.to_string(),
            query,
            subscription,
            out,
            capacity,
            self.config.clone(),
            Arc::clone(&self.stats),
        );
        tokio::spawn(task.run());

        debug!(capacity, "Subscription bridged");
        Ok(receiver)
    }

    /// Stop delivering `query` to `subscriber`. The delivery task ends
    /// without resubscribing.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidQuery`] if `query` does not parse
    /// - [`ClientError::Unsubscribe`] if the bus has no such subscription
    pub async fn unsubscribe(&self, subscriber: &str, query: &str) -> Result<(), ClientError> {
        let query = Query::parse(query)?;
        self.bus
            .unsubscribe(subscriber, &query)
            .await
            .map_err(ClientError::Unsubscribe)
    }

    /// Stop every subscription of `subscriber`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Unsubscribe`] if the subscriber holds none.
    pub async fn unsubscribe_all(&self, subscriber: &str) -> Result<(), ClientError> {
        self.bus
            .unsubscribe_all(subscriber)
            .await
            .map_err(ClientError::Unsubscribe)
    }

    /// Delivery counters across all of this client's subscriptions.
    #[must_use]
    pub fn stats(&self) -> DeliveryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The bus this client subscribes on.
    #[must_use]
    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }
}

#[async_trait]
impl<B: EventBusPort> EventsClient for LocalClient<B> {
    async fn subscribe(
        &self,
        subscriber: &str,
        query: &str,
        out_capacity: Option<usize>,
    ) -> Result<EventReceiver, ClientError> {
        LocalClient::subscribe(self, subscriber, query, out_capacity).await
    }

    async fn unsubscribe(&self, subscriber: &str, query: &str) -> Result<(), ClientError> {
        LocalClient::unsubscribe(self, subscriber, query).await
    }

    async fn unsubscribe_all(&self, subscriber: &str) -> Result<(), ClientError> {
        LocalClient::unsubscribe_all(self, subscriber).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::EventBus;

    #[tokio::test]
    async fn test_default_capacity_applies() {
        let bus = Arc::new(EventBus::new());
        bus.start().unwrap();
        let client = LocalClient::new(Arc::clone(&bus));

        let rx = client
            .subscribe("svc", "qc.event = 'NewBlock'", None)
            .await
            .unwrap();
        assert_eq!(rx.capacity(), 1);

        let rx = client
            .subscribe("svc", "qc.event = 'Tx'", Some(0))
            .await
            .unwrap();
        assert!(rx.is_handoff());
        assert_eq!(client.stats().active_tasks, 2);
    }

    #[tokio::test]
    async fn test_oversized_capacity_is_rejected_before_bus() {
        let bus = Arc::new(EventBus::new());
        bus.start().unwrap();
        let client = LocalClient::new(Arc::clone(&bus));

        let err = client
            .subscribe("big", "qc.event = 'NewBlock'", Some(usize::MAX))
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::InvalidCapacity(usize::MAX));
        assert_eq!(bus.num_clients(), 0);
        assert_eq!(client.stats().active_tasks, 0);

        let rx = client
            .subscribe("big", "qc.event = 'NewBlock'", Some(MAX_SUBSCRIPTION_CAPACITY))
            .await
            .unwrap();
        assert_eq!(rx.capacity(), MAX_SUBSCRIPTION_CAPACITY);
    }

    #[tokio::test]
    async fn test_oversized_bus_capacity_is_rejected() {
        let bus = Arc::new(EventBus::new());
        bus.start().unwrap();
        let config = BridgeConfig {
            bus_capacity: usize::MAX,
            ..BridgeConfig::default()
        };
        let client = LocalClient::with_config(Arc::clone(&bus), config);

        let err = client
            .subscribe("big", "qc.event = 'NewBlock'", None)
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::InvalidCapacity(usize::MAX));
        assert_eq!(bus.num_clients(), 0);
    }

    #[tokio::test]
    async fn test_usable_through_inbound_port() {
        let bus = Arc::new(EventBus::new());
        bus.start().unwrap();
        let client: Box<dyn EventsClient> = Box::new(LocalClient::new(Arc::clone(&bus)));

        let mut rx = client
            .subscribe("port", "qc.event = 'NewRound'", Some(2))
            .await
            .unwrap();
        bus.publish_new_round(3, 0, [7; 20]);
        assert_eq!(rx.recv().await.data.height(), Some(3));

        client.unsubscribe("port", "qc.event = 'NewRound'").await.unwrap();
        assert_eq!(
            client.unsubscribe_all("port").await,
            Err(ClientError::Unsubscribe(shared_bus::BusError::SubscriptionNotFound))
        );
    }
}
