//! Prometheus metrics for docgate.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `docgate_requests_total` | Counter | `method`, `status` | Total requests |
//! | `docgate_request_duration_seconds` | Histogram | `method` | Request latency |
//! | `docgate_in_flight_requests` | Gauge | - | In-flight requests |
//! | `docgate_interceptor_failures_total` | Counter | `interceptor`, `point` | Failed interceptors |
//! | `docgate_rollbacks_total` | Counter | `reason` | Optimistic writes undone |
//!
//! # Example
//!
//! ```rust,ignore
//! use docgate_telemetry::metrics::record_request;
//!
//! record_request("GET", 200, Duration::from_millis(45));
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use docgate_config::MetricsConfig;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

/// Request counter name.
pub const REQUESTS_TOTAL: &str = "docgate_requests_total";

/// Request latency histogram name.
pub const REQUEST_DURATION: &str = "docgate_request_duration_seconds";

const IN_FLIGHT: &str = "docgate_in_flight_requests";
const INTERCEPTOR_FAILURES: &str = "docgate_interceptor_failures_total";
const ROLLBACKS: &str = "docgate_rollbacks_total";

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initializes the metrics subsystem.
///
/// Installs the Prometheus recorder with an HTTP scrape listener on
/// `config.addr`. Disabled metrics are a no-op; the recording functions
/// below are then silently dropped by the `metrics` facade.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable listener
/// address and `TelemetryError::MetricsInit` if the recorder cannot be
/// installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let mut builder = PrometheusBuilder::new().with_http_listener(addr);
    if !config.histogram_buckets.is_empty() {
        builder = builder
            .set_buckets_for_metric(
                Matcher::Full(REQUEST_DURATION.to_string()),
                &config.histogram_buckets,
            )
            .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?;
    }

    let handle = builder
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    tracing::info!(addr = %addr, "Prometheus metrics listener installed");
    Ok(())
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_TOTAL, "Total number of HTTP requests processed");
    describe_histogram!(REQUEST_DURATION, "HTTP request duration in seconds");
    describe_gauge!(IN_FLIGHT, "Number of HTTP requests currently being processed");
    describe_counter!(
        INTERCEPTOR_FAILURES,
        "Total interceptor failures by interceptor and interception point"
    );
    describe_counter!(ROLLBACKS, "Total optimistic writes rolled back by reason");
}

/// Records a completed request.
pub fn record_request(method: &str, status_code: u16, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(REQUEST_DURATION, "method" => method.to_string()).record(duration.as_secs_f64());
}

/// Records a failed interceptor.
pub fn record_interceptor_failure(interceptor: &str, point: &str) {
    counter!(
        INTERCEPTOR_FAILURES,
        "interceptor" => interceptor.to_string(),
        "point" => point.to_string()
    )
    .increment(1);
}

/// Records a rolled back write.
pub fn record_rollback(reason: &str) {
    counter!(ROLLBACKS, "reason" => reason.to_string()).increment(1);
}

/// Guard that decrements in-flight requests on drop.
///
/// Use this to ensure the in-flight gauge is decremented even when the
/// request future is dropped.
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Creates a new guard and increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT).decrement(1.0);
    }
}
