//! # Event Receiver
//!
//! Read side of a subscription's delivery queue.
//!
//! The receiver keeps its own sender half, so the queue never reports
//! end-of-stream: once the delivery task stops, reads simply wait.
//! In handoff mode (capacity 0) each delivery carries an acknowledgement
//! that the task waits on; a delivery whose task has already given up is
//! skipped.

use crate::domain::ResultEvent;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::Stream;

/// One queued event, with the task's acknowledgement in handoff mode.
#[derive(Debug)]
pub(crate) struct Delivery {
    pub(crate) event: ResultEvent,
    ack: Option<oneshot::Sender<()>>,
}

impl Delivery {
    /// A buffered delivery; nothing waits for it.
    pub(crate) fn queued(event: ResultEvent) -> Self {
        Self { event, ack: None }
    }

    /// A handoff delivery and the receiver the task waits on.
    pub(crate) fn handoff(event: ResultEvent) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                event,
                ack: Some(tx),
            },
            rx,
        )
    }

    /// Claim the event. `None` if the task withdrew a handoff.
    fn claim(self) -> Option<ResultEvent> {
        match self.ack {
            Some(ack) => ack.send(()).ok().map(|()| self.event),
            None => Some(self.event),
        }
    }
}

/// Bounded, ordered queue of [`ResultEvent`]s for one subscription.
///
/// Dropping the receiver stops its delivery task at the next event.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<Delivery>,
    _keepalive: mpsc::Sender<Delivery>,
    capacity: usize,
}

impl EventReceiver {
    /// Create the queue. Capacity 0 selects synchronous handoff.
    pub(crate) fn channel(capacity: usize) -> (mpsc::Sender<Delivery>, Self) {
        // A handoff holds at most one pending delivery.
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let receiver = Self {
            rx,
            _keepalive: tx.clone(),
            capacity,
        };
        (tx, receiver)
    }

    /// Wait for the next event.
    ///
    /// Never returns end-of-stream; after the subscription stops this
    /// waits forever, so callers should race it against their own
    /// shutdown or timeout.
    pub async fn recv(&mut self) -> ResultEvent {
        loop {
            match self.rx.recv().await {
                Some(delivery) => {
                    if let Some(event) = delivery.claim() {
                        return event;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        }
    }

    /// Take the next event if one is ready.
    pub fn try_recv(&mut self) -> Option<ResultEvent> {
        while let Ok(delivery) = self.rx.try_recv() {
            if let Some(event) = delivery.claim() {
                return Some(event);
            }
        }
        None
    }

    /// Queue capacity requested at subscribe time (0 = handoff).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether this queue hands events off synchronously.
    #[must_use]
    pub fn is_handoff(&self) -> bool {
        self.capacity == 0
    }
}

impl Stream for EventReceiver {
    type Item = ResultEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(delivery)) => {
                    if let Some(event) = delivery.claim() {
                        return Poll::Ready(Some(event));
                    }
                }
                // Unreachable while `_keepalive` is held.
                Poll::Ready(None) => return Poll::Pending,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{EventData, Tags};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    fn event(height: u64) -> ResultEvent {
        ResultEvent::new(
            "qc.event = 'NewBlock'",
            EventData::NewBlock {
                height,
                hash: [0; 32],
                num_txs: 0,
            },
            Tags::new(),
        )
    }

    #[tokio::test]
    async fn test_queued_delivery() {
        let (tx, mut rx) = EventReceiver::channel(2);
        tx.try_send(Delivery::queued(event(1))).unwrap();
        tx.try_send(Delivery::queued(event(2))).unwrap();
        assert!(tx.try_send(Delivery::queued(event(3))).is_err());

        assert_eq!(rx.recv().await.data.height(), Some(1));
        assert_eq!(rx.try_recv().unwrap().data.height(), Some(2));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_handoff_acknowledges() {
        let (tx, mut rx) = EventReceiver::channel(0);
        assert!(rx.is_handoff());

        let (delivery, ack) = Delivery::handoff(event(5));
        tx.send(delivery).await.unwrap();
        assert_eq!(rx.recv().await.data.height(), Some(5));
        assert!(ack.await.is_ok());
    }

    #[tokio::test]
    async fn test_withdrawn_handoff_is_skipped() {
        let (tx, mut rx) = EventReceiver::channel(0);
        let (delivery, ack) = Delivery::handoff(event(1));
        tx.send(delivery).await.unwrap();
        drop(ack);

        assert!(rx.try_recv().is_none());
        tx.send(Delivery::queued(event(2))).await.unwrap();
        assert_eq!(rx.recv().await.data.height(), Some(2));
    }

    #[tokio::test]
    async fn test_never_ends_after_sender_dropped() {
        let (tx, mut rx) = EventReceiver::channel(1);
        drop(tx);

        assert!(timeout(Duration::from_millis(20), rx.recv()).await.is_err());
        assert!(timeout(Duration::from_millis(20), rx.next()).await.is_err());
    }

    #[tokio::test]
    async fn test_stream_yields_events() {
        let (tx, mut rx) = EventReceiver::channel(3);
        for h in 1..=3 {
            tx.try_send(Delivery::queued(event(h))).unwrap();
        }
        let heights: Vec<_> = (&mut rx)
            .take(3)
            .map(|e| e.data.height())
            .collect()
            .await;
        assert_eq!(heights, vec![Some(1), Some(2), Some(3)]);
    }
}
