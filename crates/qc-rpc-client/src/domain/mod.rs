//! # Domain Layer
//!
//! Configuration, errors and the delivery event. No I/O.

pub mod config;
pub mod errors;
pub mod event;
pub mod retry;

pub use config::{BridgeConfig, DEFAULT_EVENT_CAPACITY, DEFAULT_RESUBSCRIBE_TIMEOUT};
pub use errors::ClientError;
pub use event::ResultEvent;
pub use retry::RetryPolicy;
