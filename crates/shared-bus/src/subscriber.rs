//! # Event Subscriber
//!
//! Defines the subscription side of the event bus: the handle a subscriber
//! holds, the messages it yields and the reasons it can be cancelled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Key/value tags attached to a published message.
pub type Tags = BTreeMap<String, String>;

/// A message delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message<T> {
    data: T,
    tags: Tags,
}

impl<T> Message<T> {
    /// Create a new message.
    pub fn new(data: T, tags: Tags) -> Self {
        Self { data, tags }
    }

    /// The message payload.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// The tags the message was published with.
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Split into payload and tags.
    pub fn into_parts(self) -> (T, Tags) {
        (self.data, self.tags)
    }
}

/// Why a subscription stopped receiving messages.
///
/// Only [`CancelReason::Unsubscribed`] is requested by the subscriber
/// itself; every other reason is involuntary.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The client called unsubscribe / unsubscribe-all.
    #[error("client unsubscribed")]
    Unsubscribed,

    /// The subscription buffer was full when a message was published.
    #[error("client is not pulling messages fast enough")]
    OutOfCapacity,

    /// The subscription was forcibly removed by the bus operator.
    #[error("subscription evicted")]
    Evicted,

    /// The bus was stopped.
    #[error("event bus terminated")]
    Terminated,
}

impl CancelReason {
    /// Whether the subscriber asked for this cancellation.
    #[must_use]
    pub fn is_unsubscribed(self) -> bool {
        self == Self::Unsubscribed
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unsubscribed => "unsubscribed",
            Self::OutOfCapacity => "out_of_capacity",
            Self::Evicted => "evicted",
            Self::Terminated => "terminated",
        }
    }
}

/// Cancellation notice of a single subscription.
///
/// Cheap to clone; every clone observes the same, set-once reason.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<Option<CancelReason>>,
}

impl Cancellation {
    /// Wait until the subscription is cancelled and return the reason.
    ///
    /// If the bus side disappears without recording a reason, the
    /// subscription is reported as [`CancelReason::Terminated`].
    pub async fn wait(&mut self) -> CancelReason {
        if let Ok(reason) = self.rx.wait_for(Option::is_some).await {
            return (*reason).unwrap_or(CancelReason::Terminated);
        }
        self.reason().unwrap_or(CancelReason::Terminated)
    }

    /// The reason, if the subscription has already been cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        *self.rx.borrow()
    }
}

/// Bus-side half of a subscription, kept by the pub/sub server.
#[derive(Debug)]
pub(crate) struct SubscriptionSink<T> {
    tx: mpsc::Sender<Message<T>>,
    cancel: watch::Sender<Option<CancelReason>>,
}

impl<T> SubscriptionSink<T> {
    pub(crate) fn sender(&self) -> &mpsc::Sender<Message<T>> {
        &self.tx
    }

    /// Record the cancellation reason. The first reason wins.
    pub(crate) fn cancel(&self, reason: CancelReason) {
        self.cancel.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }
}

/// A subscription handle for receiving messages.
///
/// Owned by exactly one consumer. Dropping it releases the bus-side
/// buffer; the server reaps the entry on its next publish.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<Message<T>>,
    cancellation: Cancellation,
}

impl<T> Subscription<T> {
    /// Create a connected sink/subscription pair with the given buffer size.
    pub(crate) fn channel(capacity: usize) -> (SubscriptionSink<T>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let (cancel, cancel_rx) = watch::channel(None);
        (
            SubscriptionSink { tx, cancel },
            Self {
                rx,
                cancellation: Cancellation { rx: cancel_rx },
            },
        )
    }

    /// Receive the next message.
    ///
    /// # Returns
    ///
    /// - `Some(message)` - The next message, in publish order
    /// - `None` - The bus released this subscription and the buffer is drained
    pub async fn next(&mut self) -> Option<Message<T>> {
        self.rx.recv().await
    }

    /// Try to receive the next message without blocking.
    pub fn try_next(&mut self) -> Option<Message<T>> {
        self.rx.try_recv().ok()
    }

    /// A handle that resolves when this subscription is cancelled.
    #[must_use]
    pub fn cancellation(&self) -> Cancellation {
        self.cancellation.clone()
    }

    /// The cancellation reason, or `None` while the subscription is live.
    #[must_use]
    pub fn err(&self) -> Option<CancelReason> {
        self.cancellation.reason()
    }
}
