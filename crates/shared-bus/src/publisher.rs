//! # Event Publisher
//!
//! The typed blockchain event bus. Wraps a [`PubSubServer`] carrying
//! [`EventData`] and attaches the standard tags to everything it publishes.

use crate::config::BusConfig;
use crate::events::{
    Address, EventData, Hash, TxResult, ValidatorUpdate, EVENT_TYPE_KEY, TX_HASH_KEY,
    TX_HEIGHT_KEY,
};
use crate::pubsub::{BusError, PubSubServer};
use crate::query::Query;
use crate::subscriber::{Subscription, Tags};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

/// Trait for publishing events to the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the bus.
    ///
    /// # Returns
    ///
    /// The number of subscriptions that received the event.
    async fn publish(&self, event: EventData) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// In-process blockchain event bus.
pub struct EventBus {
    pubsub: PubSubServer<EventData>,
}

impl EventBus {
    /// Create a stopped event bus with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a stopped event bus with the given limits.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            pubsub: PubSubServer::new(config),
        }
    }

    /// Start the bus.
    ///
    /// # Errors
    ///
    /// [`BusError::AlreadyStarted`] if the bus is running or was stopped.
    pub fn start(&self) -> Result<(), BusError> {
        self.pubsub.start()
    }

    /// Stop the bus, terminating every subscription.
    pub fn stop(&self) {
        self.pubsub.stop();
    }

    /// Whether the bus is accepting work.
    pub fn is_running(&self) -> bool {
        self.pubsub.is_running()
    }

    /// Quit signal; observes `true` once the bus stops.
    pub fn quit(&self) -> watch::Receiver<bool> {
        self.pubsub.quit()
    }

    /// Subscribe `subscriber` to events matching `query`.
    ///
    /// # Errors
    ///
    /// See [`PubSubServer::subscribe`].
    pub fn subscribe(
        &self,
        subscriber: &str,
        query: Query,
        out_capacity: usize,
    ) -> Result<Subscription<EventData>, BusError> {
        self.pubsub.subscribe(subscriber, query, out_capacity)
    }

    /// Remove the subscription of `subscriber` for `query`.
    ///
    /// # Errors
    ///
    /// [`BusError::SubscriptionNotFound`] if there is no such subscription.
    pub fn unsubscribe(&self, subscriber: &str, query: &Query) -> Result<(), BusError> {
        self.pubsub.unsubscribe(subscriber, query)
    }

    /// Remove every subscription of `subscriber`.
    ///
    /// # Errors
    ///
    /// [`BusError::SubscriptionNotFound`] if the subscriber holds none.
    pub fn unsubscribe_all(&self, subscriber: &str) -> Result<(), BusError> {
        self.pubsub.unsubscribe_all(subscriber)
    }

    /// Forcibly remove a subscription.
    ///
    /// # Errors
    ///
    /// [`BusError::SubscriptionNotFound`] if there is no such subscription.
    pub fn evict(&self, subscriber: &str, query: &Query) -> Result<(), BusError> {
        self.pubsub.evict(subscriber, query)
    }

    /// Number of distinct subscribers.
    pub fn num_clients(&self) -> usize {
        self.pubsub.num_clients()
    }

    /// Number of subscriptions held by `subscriber`.
    pub fn num_client_subscriptions(&self, subscriber: &str) -> usize {
        self.pubsub.num_client_subscriptions(subscriber)
    }

    /// Publish `event` with extra tags; the `qc.event` tag is always set.
    pub fn publish_with_tags(&self, event: EventData, mut tags: Tags) -> usize {
        let event_type = event.event_type();
        tags.insert(EVENT_TYPE_KEY.to_string(), event_type.to_string());

        let receivers = self.pubsub.publish_with_tags(event, tags);
        debug!(event_type = %event_type, receivers, "Event published");
        receivers
    }

    /// Publish a committed block.
    pub fn publish_new_block(&self, height: u64, hash: Hash, num_txs: u32) -> usize {
        self.publish_with_tags(
            EventData::NewBlock {
                height,
                hash,
                num_txs,
            },
            Tags::new(),
        )
    }

    /// Publish a committed block header.
    pub fn publish_new_block_header(
        &self,
        height: u64,
        hash: Hash,
        parent_hash: Hash,
        timestamp: u64,
    ) -> usize {
        self.publish_with_tags(
            EventData::NewBlockHeader {
                height,
                hash,
                parent_hash,
                timestamp,
            },
            Tags::new(),
        )
    }

    /// Publish an executed transaction, tagged with `tx.hash` and `tx.height`.
    ///
    /// Application tags in `extra` are merged in; reserved keys win.
    pub fn publish_tx(
        &self,
        height: u64,
        index: u32,
        hash: Hash,
        result: TxResult,
        mut extra: Tags,
    ) -> usize {
        extra.insert(TX_HASH_KEY.to_string(), hex::encode_upper(hash));
        extra.insert(TX_HEIGHT_KEY.to_string(), height.to_string());
        self.publish_with_tags(
            EventData::Tx {
                height,
                index,
                hash,
                result,
            },
            extra,
        )
    }

    /// Publish the start of a consensus round.
    pub fn publish_new_round(&self, height: u64, round: u32, proposer: Address) -> usize {
        self.publish_with_tags(
            EventData::NewRound {
                height,
                round,
                proposer,
            },
            Tags::new(),
        )
    }

    /// Publish a received vote.
    pub fn publish_vote(
        &self,
        height: u64,
        round: u32,
        validator: Address,
        block_hash: Option<Hash>,
    ) -> usize {
        self.publish_with_tags(
            EventData::Vote {
                height,
                round,
                validator,
                block_hash,
            },
            Tags::new(),
        )
    }

    /// Publish validator set changes.
    pub fn publish_validator_set_updates(&self, updates: Vec<ValidatorUpdate>) -> usize {
        self.publish_with_tags(EventData::ValidatorSetUpdates { updates }, Tags::new())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: EventData) -> usize {
        self.publish_with_tags(event, Tags::new())
    }

    fn events_published(&self) -> u64 {
        self.pubsub.messages_published()
    }
}
