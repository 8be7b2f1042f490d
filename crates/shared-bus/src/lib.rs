//! # Shared Bus - In-Process Event Bus
//!
//! Publish/subscribe engine used by node components and local RPC clients.
//!
//! ## Model
//!
//! ```text
//! ┌──────────────┐  publish_with_tags()  ┌──────────────┐   Subscription<T>
//! │  Publisher   │ ────────────────────→ │ PubSubServer │ ───────────────→ subscriber
//! └──────────────┘                       │  (queries)   │   (msg / cancel)
//!                                        └──────────────┘
//! ```
//!
//! - Every message carries key/value [`Tags`]; subscribers select messages
//!   with a [`Query`] over those tags.
//! - A subscription is keyed by `(subscriber, query string)`.
//! - A subscription ends with a [`CancelReason`]; only
//!   [`CancelReason::Unsubscribed`] is requested by the subscriber.
//! - Publishing never blocks: an overflowing subscriber is cancelled with
//!   [`CancelReason::OutOfCapacity`].

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod events;
pub mod publisher;
pub mod pubsub;
pub mod query;
pub mod subscriber;

// Re-export main types
pub use config::BusConfig;
pub use events::{
    Address, EventData, EventType, Hash, TxResult, ValidatorUpdate, EVENT_TYPE_KEY, TX_HASH_KEY,
    TX_HEIGHT_KEY,
};
pub use publisher::{EventBus, EventPublisher};
pub use pubsub::{BusError, PubSubServer};
pub use query::{Query, QueryError};
pub use subscriber::{CancelReason, Cancellation, Message, Subscription, Tags};

/// Default buffer size of a bus-side subscription.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 100;

/// Largest buffer a subscription may request.
pub const MAX_SUBSCRIPTION_CAPACITY: usize = 1 << 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_SUBSCRIPTION_CAPACITY, 100);
        assert!(DEFAULT_SUBSCRIPTION_CAPACITY <= MAX_SUBSCRIPTION_CAPACITY);
    }
}
