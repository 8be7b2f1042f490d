//! # Quantum Telemetry
//!
//! Logging and metrics for Quantum-Chain components.
//!
//! ## Components
//!
//! - **Logs**: `tracing` with an `EnvFilter` and plain or JSON output
//! - **Metrics**: Prometheus counters and gauges in a dedicated registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quantum_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! let _guard = init_telemetry(&config).expect("Failed to init telemetry");
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `quantum-chain` | Service name in logs |
//! | `QC_LOG_LEVEL` | `info` | Log level filter |
//! | `QC_JSON_LOGS` | `false` | JSON log output |
//! | `QC_SUBSYSTEM_ID` | `00` | Subsystem identifier |

#![warn(missing_docs)]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, init_test_logging};
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, RPC_ACTIVE_SUBSCRIPTIONS,
    RPC_EVENTS_DELIVERED, RPC_EVENTS_DROPPED, RPC_RESUBSCRIBE_FAILURES, RPC_RESUBSCRIPTIONS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Metric registration or encoding failed.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
///
/// # Errors
///
/// Fails if the log filter is invalid or a metric cannot be registered.
/// Repeated calls reuse the registered metrics and the installed logger.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics_handle = register_metrics()?;
    init_logging(config)?;

    Ok(TelemetryGuard {
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "quantum-chain");
    }

    #[test]
    fn test_init_telemetry_twice() {
        let config = TelemetryConfig::default();
        let first = init_telemetry(&config).unwrap();
        let second = init_telemetry(&config).unwrap();
        drop(first);
        drop(second);

        RPC_EVENTS_DROPPED.inc();
        assert!(encode_metrics().unwrap().contains("qc_rpc_events_dropped_total"));
    }

    #[test]
    fn test_init_telemetry_rejects_bad_level() {
        let config = TelemetryConfig {
            log_level: "[[not a filter".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(
            init_telemetry(&config),
            Err(TelemetryError::Config(_))
        ));
    }
}
