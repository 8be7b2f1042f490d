//! Delivery counters shared by every task of one client.
//!
//! Each update also feeds the process-wide Prometheus metrics.

use quantum_telemetry::metrics::{
    RPC_ACTIVE_SUBSCRIPTIONS, RPC_EVENTS_DELIVERED, RPC_EVENTS_DROPPED, RPC_RESUBSCRIBE_FAILURES,
    RPC_RESUBSCRIPTIONS,
};
use serde::Serialize;
use shared_bus::CancelReason;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Point-in-time copy of a client's delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStatsSnapshot {
    /// Events placed in (or handed off to) a delivery queue.
    pub delivered: u64,
    /// Events dropped because a queue was full or a handoff went unclaimed.
    pub dropped: u64,
    /// Successful resubscriptions.
    pub resubscriptions: u64,
    /// Failed or timed-out resubscription attempts.
    pub resubscribe_failures: u64,
    /// Delivery tasks currently running.
    pub active_tasks: usize,
}

#[derive(Debug, Default)]
pub(crate) struct DeliveryStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    resubscriptions: AtomicU64,
    resubscribe_failures: AtomicU64,
    active_tasks: AtomicUsize,
}

impl DeliveryStats {
    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        RPC_EVENTS_DELIVERED.inc();
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        RPC_EVENTS_DROPPED.inc();
    }

    pub(crate) fn record_resubscribed(&self, reason: CancelReason) {
        self.resubscriptions.fetch_add(1, Ordering::Relaxed);
        RPC_RESUBSCRIPTIONS
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    pub(crate) fn record_resubscribe_failure(&self) {
        self.resubscribe_failures.fetch_add(1, Ordering::Relaxed);
        RPC_RESUBSCRIBE_FAILURES.inc();
    }

    /// Count a running task until the returned guard is dropped.
    pub(crate) fn track_task(self: &Arc<Self>) -> ActiveTask {
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        RPC_ACTIVE_SUBSCRIPTIONS.inc();
        ActiveTask {
            stats: Arc::clone(self),
        }
    }

    pub(crate) fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            resubscriptions: self.resubscriptions.load(Ordering::Relaxed),
            resubscribe_failures: self.resubscribe_failures.load(Ordering::Relaxed),
            active_tasks: self.active_tasks.load(Ordering::SeqCst),
        }
    }
}

/// Running-task guard; see [`DeliveryStats::track_task`].
#[derive(Debug)]
pub(crate) struct ActiveTask {
    stats: Arc<DeliveryStats>,
}

impl Drop for ActiveTask {
    fn drop(&mut self) {
        self.stats.active_tasks.fetch_sub(1, Ordering::SeqCst);
        RPC_ACTIVE_SUBSCRIPTIONS.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = DeliveryStats::default();
        stats.record_delivered();
        stats.record_delivered();
        stats.record_dropped();
        stats.record_resubscribed(CancelReason::Evicted);
        stats.record_resubscribe_failure();

        let snap = stats.snapshot();
        assert_eq!(snap.delivered, 2);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.resubscriptions, 1);
        assert_eq!(snap.resubscribe_failures, 1);
        assert_eq!(snap.active_tasks, 0);
    }

    #[test]
    fn test_active_task_guard() {
        let stats = Arc::new(DeliveryStats::default());
        let first = stats.track_task();
        let second = stats.track_task();
        assert_eq!(stats.snapshot().active_tasks, 2);

        drop(first);
        assert_eq!(stats.snapshot().active_tasks, 1);
        drop(second);
        assert_eq!(stats.snapshot().active_tasks, 0);
    }
}
