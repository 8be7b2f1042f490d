//! # Adapters
//!
//! Port implementations for concrete infrastructure.

pub mod event_bus;
