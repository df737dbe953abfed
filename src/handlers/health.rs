//! Health and operational endpoints.
//!
//! - `GET /v1/healthcheck` - liveness plus build/environment info
//! - `GET /debug/metrics` - read-only request counter snapshot

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::metrics::MetricsSnapshot;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    system_info: SystemInfo,
}

#[derive(Serialize)]
struct SystemInfo {
    environment: String,
    version: &'static str,
}

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "available",
///   "system_info": {
///     "environment": "development",
///     "version": "0.1.0"
///   }
/// }
/// ```
pub async fn healthcheck(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "available",
        system_info: SystemInfo {
            environment: state.config.environment.clone(),
            version: env!("CARGO_PKG_VERSION"),
        },
    })
}

#[derive(Serialize)]
pub struct DebugMetricsResponse {
    #[serde(flatten)]
    counters: MetricsSnapshot,
    uptime_seconds: u64,
}

/// Request counter snapshot for scraping or quick inspection.
///
/// The counters come from the metrics tap at the edge of the pipeline; this
/// endpoint itself is also counted.
pub async fn debug_metrics(State(state): State<AppState>) -> Json<DebugMetricsResponse> {
    Json(DebugMetricsResponse {
        counters: state.metrics.snapshot(),
        uptime_seconds: state.uptime_seconds(),
    })
}
