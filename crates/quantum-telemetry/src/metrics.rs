//! Prometheus metrics for Quantum-Chain components.
//!
//! All metrics follow the naming convention: `qc_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., events_dropped_total)
//! - **Gauge**: Value that can go up or down (e.g., active_subscriptions)

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // RPC SUBSCRIPTION BRIDGE METRICS
    // =========================================================================

    /// Events handed to subscribers' delivery queues
    pub static ref RPC_EVENTS_DELIVERED: Counter = Counter::new(
        "qc_rpc_events_delivered_total",
        "Total events delivered to subscription queues"
    ).expect("metric creation failed");

    /// Events dropped because a delivery queue was full
    pub static ref RPC_EVENTS_DROPPED: Counter = Counter::new(
        "qc_rpc_events_dropped_total",
        "Total events dropped because the subscriber's queue was full"
    ).expect("metric creation failed");

    /// Successful resubscriptions after involuntary cancellation
    pub static ref RPC_RESUBSCRIPTIONS: CounterVec = CounterVec::new(
        Opts::new("qc_rpc_resubscriptions_total", "Successful resubscriptions"),
        &["reason"]  // reason: out_of_capacity/evicted/terminated
    ).expect("metric creation failed");

    /// Failed or timed-out resubscription attempts
    pub static ref RPC_RESUBSCRIBE_FAILURES: Counter = Counter::new(
        "qc_rpc_resubscribe_failures_total",
        "Total failed resubscription attempts"
    ).expect("metric creation failed");

    /// Currently running delivery tasks
    pub static ref RPC_ACTIVE_SUBSCRIPTIONS: Gauge = Gauge::new(
        "qc_rpc_active_subscriptions",
        "Number of running subscription delivery tasks"
    ).expect("metric creation failed");
}

/// Handle for the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry. Metrics registered by
/// an earlier call are kept.
///
/// # Errors
///
/// [`TelemetryError::MetricsInit`] if the registry rejects a metric.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(RPC_EVENTS_DELIVERED.clone()),
        Box::new(RPC_EVENTS_DROPPED.clone()),
        Box::new(RPC_RESUBSCRIPTIONS.clone()),
        Box::new(RPC_RESUBSCRIBE_FAILURES.clone()),
        Box::new(RPC_ACTIVE_SUBSCRIPTIONS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
///
/// # Errors
///
/// [`TelemetryError::MetricsInit`] if encoding fails.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_encode() {
        register_metrics().unwrap();
        register_metrics().unwrap();
        RPC_EVENTS_DROPPED.inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("qc_rpc_events_dropped_total"));
    }

    #[test]
    fn test_counter_increment() {
        RPC_EVENTS_DELIVERED.inc();
        assert!(RPC_EVENTS_DELIVERED.get() >= 1.0);
    }

    #[test]
    fn test_labelled_counter() {
        RPC_RESUBSCRIPTIONS.with_label_values(&["evicted"]).inc();
        assert!(RPC_RESUBSCRIPTIONS.with_label_values(&["evicted"]).get() >= 1.0);
    }

    #[test]
    fn test_gauge() {
        RPC_ACTIVE_SUBSCRIPTIONS.inc();
        RPC_ACTIVE_SUBSCRIPTIONS.dec();
    }
}
