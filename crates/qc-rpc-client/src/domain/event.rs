//! Delivery event produced by the bridge.

use serde::{Deserialize, Serialize};
use shared_bus::{EventData, EventType, Tags};

/// An event forwarded to a subscriber, tagged with the query it matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEvent {
    /// Source string of the subscription's query.
    pub query: String,
    /// Event payload.
    pub data: EventData,
    /// Tags the event was published with.
    pub tags: Tags,
}

impl ResultEvent {
    /// Build a delivery event.
    pub fn new(query: impl Into<String>, data: EventData, tags: Tags) -> Self {
        Self {
            query: query.into(),
            data,
            tags,
        }
    }

    /// Event type of the payload.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.data.event_type()
    }
}
