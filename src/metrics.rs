//! Request metrics and the Prometheus exporter.
//!
//! Two sinks record the same observations:
//!
//! - [`RequestMetrics`]: three atomic counters (requests received, responses
//!   sent, cumulative processing time) exposed as a JSON snapshot at
//!   `GET /debug/metrics` for quick inspection without a scraper
//! - the `metrics` facade, exported in Prometheus format on a dedicated
//!   listener when `METRICS_PORT` is non-zero
//!
//! # Usage
//!
//! ```rust,ignore
//! use marquee::metrics::{try_init_exporter, RequestMetrics};
//!
//! // Initialize the exporter once at startup
//! try_init_exporter(addr);
//!
//! // Counters live in the application state
//! let counters = RequestMetrics::default();
//! counters.record_received();
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_RECEIVED_TOTAL: &str = "marquee_requests_received_total";
    pub const RESPONSES_SENT_TOTAL: &str = "marquee_responses_sent_total";
    pub const REQUEST_DURATION_SECONDS: &str = "marquee_request_duration_seconds";
    pub const LIMITER_EVICTIONS_TOTAL: &str = "marquee_limiter_evictions_total";
}

/// In-process request counters behind atomic increments.
///
/// Updated on every request by the metrics tap; read by the snapshot
/// endpoint. No lock is involved anywhere.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    processing_time_us: AtomicU64,
}

impl RequestMetrics {
    pub fn record_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self, elapsed: Duration) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.processing_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests_received: self.requests_received.load(Ordering::Relaxed),
            total_responses_sent: self.responses_sent.load(Ordering::Relaxed),
            total_processing_time_us: self.processing_time_us.load(Ordering::Relaxed),
        }
    }
}

/// Read-only view of the request counters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    pub total_processing_time_us: u64,
}

/// Initialize the Prometheus metrics exporter.
///
/// This sets up metric descriptions and starts the Prometheus HTTP listener
/// on the specified address.
pub fn init_exporter(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_RECEIVED_TOTAL,
        "Total number of HTTP requests received"
    );
    describe_counter!(
        names::RESPONSES_SENT_TOTAL,
        "Total number of HTTP responses sent"
    );
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request processing duration in seconds"
    );
    describe_counter!(
        names::LIMITER_EVICTIONS_TOTAL,
        "Total number of idle rate limiter entries evicted"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize the exporter, logging any errors but not failing.
///
/// Metrics are an operability concern; the API still serves without them.
pub fn try_init_exporter(metrics_addr: SocketAddr) {
    if let Err(e) = init_exporter(metrics_addr) {
        error!(error = %e, "failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record an inbound request.
pub fn record_request_received() {
    counter!(names::REQUESTS_RECEIVED_TOTAL).increment(1);
}

/// Record a completed request with its outcome and duration.
pub fn record_request_completed(method: &str, status: u16, duration_secs: f64) {
    counter!(names::RESPONSES_SENT_TOTAL, "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(names::REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(duration_secs);
}

/// Record limiter entries removed by the janitor.
pub fn record_limiter_evictions(count: u64) {
    if count > 0 {
        counter!(names::LIMITER_EVICTIONS_TOTAL).increment(count);
    }
}
