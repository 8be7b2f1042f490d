//! [`EventBusPort`] for the in-process [`EventBus`].

use crate::ports::EventBusPort;
use async_trait::async_trait;
use shared_bus::{BusError, EventBus, EventData, Query, Subscription};
use tokio::sync::watch;

#[async_trait]
impl EventBusPort for EventBus {
    async fn subscribe(
        &self,
        subscriber: &str,
        query: Query,
        out_capacity: usize,
    ) -> Result<Subscription<EventData>, BusError> {
        EventBus::subscribe(self, subscriber, query, out_capacity)
    }

    async fn unsubscribe(&self, subscriber: &str, query: &Query) -> Result<(), BusError> {
        EventBus::unsubscribe(self, subscriber, query)
    }

    async fn unsubscribe_all(&self, subscriber: &str) -> Result<(), BusError> {
        EventBus::unsubscribe_all(self, subscriber)
    }

    fn is_running(&self) -> bool {
        EventBus::is_running(self)
    }

    fn quit(&self) -> watch::Receiver<bool> {
        EventBus::quit(self)
    }
}
