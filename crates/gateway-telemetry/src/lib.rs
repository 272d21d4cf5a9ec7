//! # Gateway Telemetry
//!
//! Structured logging and Prometheus metrics for Karma-Gate.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `KG_SERVICE_NAME` | `karma-gate` | Service name in logs |
//! | `KG_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `KG_JSON_LOGS` | `false` (`true` in containers) | JSON log output |
//! | `KG_CONSOLE_OUTPUT` | `true` | Write logs to stderr |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    gather_metrics, register_metrics, AUDIT_ENTRIES, AUDIT_INTEGRITY_VIOLATIONS,
    AUTHORIZATION_OUTCOMES, PENDING_REQUESTS, REPLAY_ATTEMPTS, SIGNALS_ACCEPTED,
    SIGNALS_REJECTED, SIGNALS_SIGNED, UNAUTHORIZED_CHANNEL,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    Metrics(String),
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
