//! Prometheus Metrics HTTP Handler

use super::handlers::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};

/// GET /metrics - Prometheus metrics endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    // Refresh gauges before encoding
    crate::metrics::update_cache_stats(&state.service.node().id, &state.service.cache_stats());
    crate::metrics::set_cluster_members(state.service.membership().len());
    update_system_metrics();

    match crate::metrics::encode_metrics() {
        Ok(metrics) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            metrics,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Initialize metrics with default values
pub fn init_metrics() {
    // Force initialization of all metrics by accessing them
    let _ = &*crate::metrics::CACHE_OPS_TOTAL;
    let _ = &*crate::metrics::CACHE_ENTRIES;
    let _ = &*crate::metrics::CACHE_EVICTIONS;
    let _ = &*crate::metrics::CLIENT_REQUESTS_TOTAL;
    let _ = &*crate::metrics::ELECTIONS_TOTAL;
    let _ = &*crate::metrics::CLUSTER_MEMBERS;
    let _ = &*crate::metrics::MEMBERSHIP_SYNC_TOTAL;
    let _ = &*crate::metrics::PROCESS_MEMORY_BYTES;
    let _ = &*crate::metrics::PROCESS_CPU_USAGE;

    tracing::info!("Prometheus metrics initialized (9 metric types registered)");
}

/// Update system metrics
pub fn update_system_metrics() {
    if let Ok(usage) = sys_info::mem_info() {
        crate::metrics::PROCESS_MEMORY_BYTES
            .with_label_values(&["used"])
            .set((usage.total - usage.avail) as i64 * 1024);
        crate::metrics::PROCESS_MEMORY_BYTES
            .with_label_values(&["total"])
            .set(usage.total as i64 * 1024);
    }

    if let Ok(load) = sys_info::loadavg() {
        crate::metrics::PROCESS_CPU_USAGE
            .with_label_values(&["1min"])
            .set((load.one * 100.0) as i64);
        crate::metrics::PROCESS_CPU_USAGE
            .with_label_values(&["5min"])
            .set((load.five * 100.0) as i64);
    }
}
