//! # Andon Telemetry
//!
//! Structured logging and Prometheus metrics for the Andon relay.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use andon_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // logs and metrics are live until the guard drops
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | unset | Full filter directive, overrides `ANDON_LOG_LEVEL` |
//! | `ANDON_LOG_LEVEL` | `info` | Log level filter |
//! | `ANDON_JSON_LOGS` | container-dependent | JSON log output |
//! | `ANDON_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `ANDON_SERVICE_NAME` | `andon-relay` | Service name in startup logs |
//! | `ANDON_SITE` | `default` | Plant or site identifier |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, record_relay_sample, register_metrics, MetricsHandle, RelaySample,
    HTTP_REQUESTS, HTTP_REQUEST_DURATION,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics and install the global subscriber.
///
/// Returns a guard to hold for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first; they don't depend on the subscriber
    let metrics_handle = register_metrics()?;

    logging::init_logging(&config)?;

    tracing::info!(
        service = %config.full_service_name(),
        json_logs = config.json_logs,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        service_name: config.full_service_name(),
        _metrics: metrics_handle,
    })
}

/// Keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

/// Convenience macro for recording a metric with a value.
#[macro_export]
macro_rules! metric_observe {
    ($metric:expr, $value:expr) => {
        $metric.observe($value)
    };
    ($metric:expr, $labels:expr, $value:expr) => {
        $metric.with_label_values($labels).observe($value)
    };
}
