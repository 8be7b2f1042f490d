//! Structured logging setup.
//!
//! Installs a global `tracing` subscriber with an [`EnvFilter`] built from
//! the configured level and either a human-readable or a JSON `fmt` layer.
//! JSON records carry `timestamp`, `level`, `target`, the message and every
//! structured field, which is what log shippers expect.

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize global logging.
///
/// Safe to call more than once: if a global subscriber is already installed
/// (by an earlier call or by the host application) the existing one is kept
/// and `Ok(false)` is returned.
///
/// # Errors
///
/// [`TelemetryError::Config`] if `log_level` is not a valid filter directive.
pub fn init_logging(config: &TelemetryConfig) -> Result<bool, TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("invalid log level: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json_logs {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .is_ok()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::debug!(
            service = %config.full_service_name(),
            json_logs = config.json_logs,
            "Structured logging initialized"
        );
    }
    Ok(installed)
}

/// Initialize logging for tests: honours `RUST_LOG`, writes through the
/// test harness capture, and never fails.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_rejected() {
        let config = TelemetryConfig {
            log_level: "[[not a filter".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(TelemetryError::Config(_))
        ));
    }

    #[test]
    fn test_repeated_init_is_harmless() {
        init_test_logging();
        let config = TelemetryConfig::default();
        assert!(matches!(init_logging(&config), Ok(false)));
    }
}
