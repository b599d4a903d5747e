//! # Docgate Telemetry
//!
//! Observability for the gateway: structured logging through
//! `tracing-subscriber` and Prometheus metrics through the `metrics` facade.
//!
//! ## Example
//!
//! ```rust,ignore
//! use docgate_config::GatewayConfig;
//! use docgate_telemetry::init_telemetry;
//!
//! let config = GatewayConfig::default();
//! init_telemetry(&config)?;
//!
//! tracing::info!(request_id = %id, "Processing request");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

use docgate_config::GatewayConfig;

pub use error::TelemetryError;
pub use logging::{fields, init_logging};
pub use metrics::{init_metrics, render_metrics};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging and metrics from the gateway configuration.
///
/// Logging is initialized first so that metrics failures are reported.
///
/// # Errors
///
/// Returns `TelemetryError` if any subsystem fails to initialize.
pub fn init_telemetry(config: &GatewayConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    Ok(())
}
