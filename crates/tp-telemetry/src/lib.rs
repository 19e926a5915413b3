//! # TP Telemetry
//!
//! Logging and metrics for transaction processors.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tp_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_telemetry(&config).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `transaction-processor` | Service name attached to logs |
//! | `TP_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `TP_JSON_LOGS` | `false` (`true` in containers) | JSON formatted output |
//! | `TP_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, DROPPED_FRAMES, PENDING_SUB_REQUESTS, PROCESS_DURATION,
    PROCESS_REQUESTS, REGISTERED_HANDLERS, SUB_REQUESTS, UNSOLICITED_MESSAGES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Install the global subscriber and register every metric.
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    tracing_setup::init_tracing(config)
}
