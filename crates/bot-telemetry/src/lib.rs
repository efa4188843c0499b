//! # Bot Telemetry
//!
//! Logging and metrics for the poll bot.
//!
//! - **Logs**: `tracing` events rendered by `tracing-subscriber`, human
//!   readable or JSON, always on stderr
//! - **Metrics**: Prometheus counters, encoded as text at shutdown
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bot_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // metrics are logged when the guard drops
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `POLL_BOT_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter |
//! | `POLL_BOT_JSON_LOGS` | `false` | JSON log lines |
//! | `POLL_BOT_SERVICE_NAME` | `poll-bot` | Service name in logs |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, HANDLER_FAILURES, HANDLING_DURATION,
    MESSAGES_IGNORED, MESSAGES_RECEIVED, REPLIES_SENT, STALE_TALLIES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    register_metrics()?;
    init_logging(&config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active. Logs the final metrics on drop.
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        match encode_metrics() {
            Ok(text) => tracing::info!(service = %self.service_name, metrics = %text, "Final metrics"),
            Err(e) => tracing::warn!(error = %e, "Could not encode metrics"),
        }
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
