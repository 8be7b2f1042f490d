//! # Ports Layer
//!
//! - Inbound: what the local client offers ([`EventsClient`])
//! - Outbound: what it needs from the event bus ([`EventBusPort`])

pub mod inbound;
pub mod outbound;

pub use inbound::EventsClient;
pub use outbound::EventBusPort;
