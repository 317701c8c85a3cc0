//! Prometheus Metrics for Speedy
//!
//! - Cache operations and occupancy
//! - Client routing outcomes
//! - Leader elections and membership sync
//! - System metrics

use crate::cluster::{ClusterResult, SyncReport};
use crate::core::CacheStats;
use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec,
};

lazy_static! {
    // ============================================================================
    // Cache Metrics
    // ============================================================================

    /// Cache operations by type (get, put) and outcome
    pub static ref CACHE_OPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "speedy_cache_operations_total",
        "Total number of cache operations by type",
        &["operation", "status"]
    ).unwrap();

    /// Current number of entries per node
    pub static ref CACHE_ENTRIES: IntGaugeVec = register_int_gauge_vec!(
        "speedy_cache_entries",
        "Current number of entries in the cache",
        &["node"]
    ).unwrap();

    /// Evictions since start per node
    pub static ref CACHE_EVICTIONS: IntGaugeVec = register_int_gauge_vec!(
        "speedy_cache_evictions",
        "Entries evicted since start",
        &["node"]
    ).unwrap();

    // ============================================================================
    // Client Routing Metrics
    // ============================================================================

    /// Routed requests by operation and outcome (hit, miss, unavailable, ok, error)
    pub static ref CLIENT_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "speedy_client_requests_total",
        "Requests routed by the client",
        &["operation", "status"]
    ).unwrap();

    // ============================================================================
    // Cluster Metrics
    // ============================================================================

    /// Elections by outcome (won, deferred, timeout)
    pub static ref ELECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "speedy_elections_total",
        "Leader election rounds by outcome",
        &["outcome"]
    ).unwrap();

    /// Known cluster members
    pub static ref CLUSTER_MEMBERS: IntGauge = register_int_gauge!(
        "speedy_cluster_members",
        "Number of known cluster members"
    ).unwrap();

    /// Membership sync passes by result (changed, unchanged, partial, error)
    pub static ref MEMBERSHIP_SYNC_TOTAL: IntCounterVec = register_int_counter_vec!(
        "speedy_membership_sync_total",
        "Membership sync passes by result",
        &["result"]
    ).unwrap();

    // ============================================================================
    // System Metrics
    // ============================================================================

    /// Process memory usage
    pub static ref PROCESS_MEMORY_BYTES: IntGaugeVec = register_int_gauge_vec!(
        "speedy_process_memory_bytes",
        "Process memory usage in bytes",
        &["type"]
    ).unwrap();

    /// Process CPU usage (percentage * 100)
    pub static ref PROCESS_CPU_USAGE: IntGaugeVec = register_int_gauge_vec!(
        "speedy_process_cpu_usage_percent",
        "Process CPU usage percentage",
        &["core"]
    ).unwrap();
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record cache operation
pub fn record_cache_op(operation: &str, status: &str) {
    CACHE_OPS_TOTAL.with_label_values(&[operation, status]).inc();
}

/// Publish a node's cache occupancy
pub fn update_cache_stats(node: &str, stats: &CacheStats) {
    CACHE_ENTRIES
        .with_label_values(&[node])
        .set(stats.entries as i64);
    CACHE_EVICTIONS
        .with_label_values(&[node])
        .set(stats.evictions as i64);
}

/// Record a routed client request
pub fn record_client_request(operation: &str, status: &str) {
    CLIENT_REQUESTS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// Record an election round
pub fn record_election(outcome: &str) {
    ELECTIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_cluster_members(count: usize) {
    CLUSTER_MEMBERS.set(count as i64);
}

/// Record the outcome of one membership sync pass
pub fn record_membership_sync(outcome: &ClusterResult<SyncReport>) {
    let result = match outcome {
        Ok(report) if report.is_partial() => "partial",
        Ok(report) if report.changed => "changed",
        Ok(_) => "unchanged",
        Err(_) => "error",
    };
    MEMBERSHIP_SYNC_TOTAL.with_label_values(&[result]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterError;

    #[test]
    fn test_record_cache_op() {
        record_cache_op("get", "hit");
        record_cache_op("put", "ok");

        let metrics = encode_metrics().unwrap();
        assert!(metrics.contains("speedy_cache_operations_total"));
    }

    #[test]
    fn test_update_cache_stats() {
        let stats = CacheStats {
            entries: 7,
            evictions: 2,
            ..Default::default()
        };
        update_cache_stats("metrics-test-node", &stats);

        assert_eq!(
            CACHE_ENTRIES
                .with_label_values(&["metrics-test-node"])
                .get(),
            7
        );
        assert_eq!(
            CACHE_EVICTIONS
                .with_label_values(&["metrics-test-node"])
                .get(),
            2
        );
    }

    #[test]
    fn test_record_membership_sync() {
        let before = MEMBERSHIP_SYNC_TOTAL.with_label_values(&["error"]).get();
        record_membership_sync(&Err(ClusterError::NoNodeSelected));
        assert!(MEMBERSHIP_SYNC_TOTAL.with_label_values(&["error"]).get() > before);

        record_membership_sync(&Ok(SyncReport::default()));
        let metrics = encode_metrics().unwrap();
        assert!(metrics.contains("speedy_membership_sync_total"));
    }
}
