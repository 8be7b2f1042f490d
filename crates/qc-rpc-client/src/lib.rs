//! # QC RPC Client
//!
//! In-process RPC client for event subscriptions.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Bridge raw event bus subscriptions to callers:
//! - One bounded, ordered delivery queue per subscription
//! - Publishing never blocks: a full queue drops the event and logs it
//! - Capacity 0 hands each event off synchronously instead
//! - Involuntary cancellation (eviction, overflow, bus restart) triggers
//!   automatic resubscription; explicit unsubscribe and host shutdown end
//!   delivery cleanly
//!
//! ## Module Structure
//!
//! ```text
//! qc-rpc-client/
//! ├── domain/      # BridgeConfig, RetryPolicy, ResultEvent, ClientError
//! ├── ports/       # EventsClient (inbound), EventBusPort (outbound)
//! ├── adapters/    # EventBusPort for shared_bus::EventBus
//! └── service/     # LocalClient, delivery task, EventReceiver
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qc_rpc_client::LocalClient;
//! use shared_bus::EventBus;
//! use std::sync::Arc;
//!
//! let bus = Arc::new(EventBus::new());
//! bus.start()?;
//!
//! let client = LocalClient::new(Arc::clone(&bus));
//! let mut events = client.subscribe("explorer", "qc.event = 'NewBlock'", Some(16)).await?;
//! let event = events.recv().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use domain::{
    BridgeConfig, ClientError, ResultEvent, RetryPolicy, DEFAULT_EVENT_CAPACITY,
    DEFAULT_RESUBSCRIBE_TIMEOUT,
};
pub use ports::{EventBusPort, EventsClient};
pub use service::{DeliveryStatsSnapshot, EventReceiver, LocalClient, StopReason};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
