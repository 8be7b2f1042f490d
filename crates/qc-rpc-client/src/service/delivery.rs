//! # Delivery Task
//!
//! One task per subscription. It forwards bus messages into the caller's
//! delivery queue and replaces the bus subscription when the bus cancels
//! it involuntarily.
//!
//! ```text
//!                 involuntary cancel
//!   Delivering ─────────────────────→ Resubscribing
//!       ↑  │                              │  │
//!       │  │ unsubscribed / shutdown /    │  │ bus stopped / shutdown
//!       │  │ receiver dropped             │  │
//!       │  ↓                              │  ↓
//!       │  Stopped ←──────────────────────┼──┘
//!       └─────────────────────────────────┘
//!                    resubscribed
//! ```
//!
//! Each iteration waits on shutdown, cancellation, the receiver closing
//! and the next message, in that priority order, and acts on exactly one
//! of them. A task stopped by a dropped receiver releases its bus entry.

use super::receiver::Delivery;
use super::stats::{ActiveTask, DeliveryStats};
use crate::domain::{BridgeConfig, ResultEvent};
use crate::ports::EventBusPort;
use shared_bus::{CancelReason, Cancellation, EventData, Message, Query, Subscription};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{oneshot, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Why a delivery task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The subscriber unsubscribed.
    Unsubscribed,
    /// The host shut down or the bus stopped.
    Shutdown,
    /// The caller dropped its [`EventReceiver`](super::EventReceiver).
    ReceiverDropped,
}

enum State {
    Delivering,
    Resubscribing(CancelReason),
    Stopped(StopReason),
}

enum Wake {
    Shutdown,
    Cancelled(CancelReason),
    ReceiverClosed,
    Message(Option<Message<EventData>>),
}

enum Handoff {
    Taken,
    Unclaimed,
    Closed,
    Shutdown,
}

pub(crate) struct DeliveryTask<B: EventBusPort> {
    bus: Arc<B>,
    subscriber: String,
    query: Query,
    subscription: Subscription<EventData>,
    cancellation: Cancellation,
    out: mpsc::Sender<Delivery>,
    out_capacity: usize,
    shutdown: watch::Receiver<bool>,
    config: BridgeConfig,
    stats: Arc<DeliveryStats>,
    _active: ActiveTask,
}

impl<B: EventBusPort> DeliveryTask<B> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        bus: Arc<B>,
        subscriber: String,
        query: Query,
        subscription: Subscription<EventData>,
        out: mpsc::Sender<Delivery>,
        out_capacity: usize,
        config: BridgeConfig,
        stats: Arc<DeliveryStats>,
    ) -> Self {
        let shutdown = bus.quit();
        let cancellation = subscription.cancellation();
        let active = stats.track_task();
        Self {
            bus,
            subscriber,
            query,
            subscription,
            cancellation,
            out,
            out_capacity,
            shutdown,
            config,
            stats,
            _active: active,
        }
    }

    /// Run until a terminal condition.
    pub(crate) async fn run(mut self) -> StopReason {
        let mut state = State::Delivering;
        let reason = loop {
            state = match state {
                State::Delivering => self.deliver_next().await,
                State::Resubscribing(reason) => self.resubscribe(reason).await,
                State::Stopped(reason) => break reason,
            };
        };

        if reason == StopReason::ReceiverDropped {
            self.release().await;
        }

        debug!(
            subscriber = %self.subscriber,
            query = %self.query,
            reason = ?reason,
            "Delivery task stopped"
        );
        reason
    }

    async fn release(&mut self) {
        if let Err(e) = self.bus.unsubscribe(&self.subscriber, &self.query).await {
            debug!(query = %self.query, error = %e, "Bus entry already released");
        }
    }

    async fn deliver_next(&mut self) -> State {
        let wake = tokio::select! {
            biased;
            () = shutdown_signal(&mut self.shutdown) => Wake::Shutdown,
            reason = self.cancellation.wait() => Wake::Cancelled(reason),
            () = self.out.closed() => Wake::ReceiverClosed,
            msg = self.subscription.next() => Wake::Message(msg),
        };

        match wake {
            Wake::Shutdown => State::Stopped(StopReason::Shutdown),
            Wake::Cancelled(reason) => self.on_cancelled(reason),
            Wake::ReceiverClosed => self.receiver_dropped(),
            Wake::Message(Some(msg)) => self.forward(msg).await,
            // The bus released the subscription without a recorded reason.
            Wake::Message(None) => {
                let reason = self.subscription.err().unwrap_or(CancelReason::Terminated);
                self.on_cancelled(reason)
            }
        }
    }

    fn on_cancelled(&self, reason: CancelReason) -> State {
        if reason.is_unsubscribed() {
            debug!(
                subscriber = %self.subscriber,
                query = %self.query,
                "Subscription closed by unsubscribe"
            );
            return State::Stopped(StopReason::Unsubscribed);
        }

        error!(
            subscriber = %self.subscriber,
            query = %self.query,
            reason = %reason,
            "Subscription was cancelled, resubscribing"
        );
        State::Resubscribing(reason)
    }

    async fn forward(&mut self, msg: Message<EventData>) -> State {
        let (data, tags) = msg.into_parts();
        let event = ResultEvent::new(self.query.as_str(), data, tags);

        if self.out_capacity == 0 {
            self.hand_off(event).await
        } else {
            self.enqueue(event)
        }
    }

    fn enqueue(&self, event: ResultEvent) -> State {
        match self.out.try_send(Delivery::queued(event)) {
            Ok(()) => {
                self.stats.record_delivered();
                State::Delivering
            }
            Err(TrySendError::Full(delivery)) => {
                error!(
                    query = %self.query,
                    data = ?delivery.event.data,
                    "Wanted to publish ResultEvent, but out channel is full"
                );
                self.stats.record_dropped();
                State::Delivering
            }
            Err(TrySendError::Closed(_)) => self.receiver_dropped(),
        }
    }

    async fn hand_off(&mut self, event: ResultEvent) -> State {
        let (delivery, mut ack) = Delivery::handoff(event);
        let out = &self.out;
        let handoff_timeout = self.config.handoff_timeout;

        let outcome = {
            let ack = &mut ack;
            tokio::select! {
                biased;
                () = shutdown_signal(&mut self.shutdown) => Handoff::Shutdown,
                outcome = async move {
                    if out.send(delivery).await.is_err() {
                        return Handoff::Closed;
                    }
                    match ack.await {
                        Ok(()) => Handoff::Taken,
                        Err(_) => Handoff::Closed,
                    }
                } => outcome,
                () = sleep_or_forever(handoff_timeout) => Handoff::Unclaimed,
            }
        };
        let outcome = match outcome {
            Handoff::Unclaimed if claimed_late(&mut ack) => Handoff::Taken,
            other => other,
        };

        match outcome {
            Handoff::Taken => {
                self.stats.record_delivered();
                State::Delivering
            }
            Handoff::Unclaimed => {
                error!(
                    query = %self.query,
                    timeout_ms = handoff_timeout.map_or(0, |t| t.as_millis() as u64),
                    "ResultEvent handoff was not claimed in time, dropping"
                );
                self.stats.record_dropped();
                State::Delivering
            }
            Handoff::Closed => self.receiver_dropped(),
            Handoff::Shutdown => State::Stopped(StopReason::Shutdown),
        }
    }

    fn receiver_dropped(&self) -> State {
        debug!(
            subscriber = %self.subscriber,
            query = %self.query,
            "Event receiver dropped"
        );
        State::Stopped(StopReason::ReceiverDropped)
    }

    async fn resubscribe(&mut self, reason: CancelReason) -> State {
        let mut attempt: u32 = 0;
        loop {
            if !self.bus.is_running() {
                debug!(query = %self.query, "Event bus stopped, not resubscribing");
                return State::Stopped(StopReason::Shutdown);
            }

            let bus = &self.bus;
            let result = tokio::select! {
                biased;
                () = shutdown_signal(&mut self.shutdown) => {
                    return State::Stopped(StopReason::Shutdown);
                }
                result = timeout(
                    self.config.resubscribe_timeout,
                    bus.subscribe(&self.subscriber, self.query.clone(), self.config.bus_capacity),
                ) => result,
            };

            match result {
                Ok(Ok(subscription)) => {
                    self.cancellation = subscription.cancellation();
                    self.subscription = subscription;
                    self.stats.record_resubscribed(reason);
                    info!(
                        subscriber = %self.subscriber,
                        query = %self.query,
                        attempts = attempt + 1,
                        "Resubscribed"
                    );
                    return State::Delivering;
                }
                Ok(Err(e)) => {
                    warn!(query = %self.query, attempt, error = %e, "Failed to resubscribe");
                }
                Err(_) => {
                    warn!(
                        query = %self.query,
                        attempt,
                        timeout_ms = self.config.resubscribe_timeout.as_millis() as u64,
                        "Resubscribe attempt timed out"
                    );
                }
            }
            self.stats.record_resubscribe_failure();

            let delay = self.config.retry.next(attempt);
            attempt = attempt.saturating_add(1);
            if delay.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                biased;
                () = shutdown_signal(&mut self.shutdown) => {
                    return State::Stopped(StopReason::Shutdown);
                }
                () = sleep(delay) => {}
            }
        }
    }
}

/// Resolves once the host signals shutdown or the signal source is gone.
async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|quit| *quit).await;
}

/// Settle a handoff whose deadline fired: refuse further claims, then
/// report whether the consumer got in first.
fn claimed_late(ack: &mut oneshot::Receiver<()>) -> bool {
    ack.close();
    ack.try_recv().is_ok()
}

async fn sleep_or_forever(limit: Option<Duration>) {
    match limit {
        Some(limit) => sleep(limit).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::receiver::EventReceiver;
    use shared_bus::EventBus;
    use tokio::task::JoinHandle;

    fn spawn_task(
        bus: &Arc<EventBus>,
        query: &str,
        out_capacity: usize,
        config: BridgeConfig,
    ) -> (JoinHandle<StopReason>, EventReceiver, Arc<DeliveryStats>) {
        let query = Query::parse(query).unwrap();
        let subscription = bus.subscribe("task-test", query.clone(), 8).unwrap();
        let (out, receiver) = EventReceiver::channel(out_capacity);
        let stats = Arc::new(DeliveryStats::default());
        let task = DeliveryTask::new(
            Arc::clone(bus),
            "task-test".to_string(),
            query,
            subscription,
            out,
            out_capacity,
            config,
            Arc::clone(&stats),
        );
        (tokio::spawn(task.run()), receiver, stats)
    }

    fn started_bus() -> Arc<EventBus> {
        let bus = Arc::new(EventBus::new());
        bus.start().unwrap();
        bus
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_task() {
        let bus = started_bus();
        let (handle, _rx, stats) =
            spawn_task(&bus, "qc.event = 'NewBlock'", 1, BridgeConfig::default());

        let query = Query::parse("qc.event = 'NewBlock'").unwrap();
        bus.unsubscribe("task-test", &query).unwrap();

        let reason = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(reason, StopReason::Unsubscribed);
        assert_eq!(stats.snapshot().active_tasks, 0);
        assert_eq!(bus.num_clients(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let bus = started_bus();
        let (handle, _rx, _stats) =
            spawn_task(&bus, "qc.event = 'NewBlock'", 1, BridgeConfig::default());

        bus.stop();
        let reason = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(reason, StopReason::Shutdown);
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_task() {
        let bus = started_bus();
        let (handle, rx, _stats) =
            spawn_task(&bus, "qc.event = 'NewBlock'", 1, BridgeConfig::default());
        drop(rx);

        bus.publish_new_block(1, [0; 32], 0);
        let reason = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(reason, StopReason::ReceiverDropped);
    }

    #[tokio::test]
    async fn test_dropped_receiver_releases_bus_entry() {
        let bus = started_bus();
        let (handle, rx, stats) =
            spawn_task(&bus, "qc.event = 'NewBlock'", 1, BridgeConfig::default());
        drop(rx);

        let reason = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(reason, StopReason::ReceiverDropped);
        assert_eq!(stats.snapshot().active_tasks, 0);
        assert_eq!(bus.num_client_subscriptions("task-test"), 0);
    }

    #[test]
    fn test_claimed_late_sees_ack_sent_before_close() {
        let (tx, mut ack) = oneshot::channel::<()>();
        tx.send(()).unwrap();
        assert!(claimed_late(&mut ack));
    }

    #[test]
    fn test_claimed_late_refuses_later_claims() {
        let (tx, mut ack) = oneshot::channel::<()>();
        assert!(!claimed_late(&mut ack));
        assert!(tx.send(()).is_err());
    }

    #[tokio::test]
    async fn test_eviction_resubscribes() {
        let bus = started_bus();
        let (_handle, mut rx, stats) =
            spawn_task(&bus, "qc.event = 'NewBlock'", 4, BridgeConfig::default());

        let query = Query::parse("qc.event = 'NewBlock'").unwrap();
        bus.evict("task-test", &query).unwrap();

        timeout(Duration::from_secs(1), async {
            while stats.snapshot().resubscriptions == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(bus.num_client_subscriptions("task-test"), 1);

        bus.publish_new_block(9, [0; 32], 0);
        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(event.data.height(), Some(9));
        assert_eq!(event.query, "qc.event = 'NewBlock'");
    }

    #[tokio::test]
    async fn test_unclaimed_handoff_is_dropped() {
        let bus = started_bus();
        let config = BridgeConfig {
            handoff_timeout: Some(Duration::from_millis(100)),
            ..BridgeConfig::default()
        };
        let (_handle, mut rx, stats) = spawn_task(&bus, "qc.event = 'NewBlock'", 0, config);

        bus.publish_new_block(1, [0; 32], 0);
        timeout(Duration::from_secs(1), async {
            while stats.snapshot().dropped == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // The withdrawn event is skipped; the next one arrives.
        bus.publish_new_block(2, [0; 32], 0);
        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(event.data.height(), Some(2));
    }
}
