use crate::core::SpeedyError;
use thiserror::Error;

/// Cluster error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Node already exists: {0}")]
    NodeExists(String),
    #[error("No node selected for sync (membership is empty)")]
    NoNodeSelected,
    #[error("Failed to connect to {node}: {reason}")]
    Connect { node: String, reason: String },
    #[error("RPC error: {0}")]
    Rpc(#[from] SpeedyError),
    #[error("Partial sync: {} of {total} node updates failed", errors.len())]
    PartialSync { total: usize, errors: Vec<String> },
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ClusterResult<T> = Result<T, ClusterError>;

/// Outcome of one membership reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// At least one diff entry was applied
    pub changed: bool,
    /// Number of diff entries examined
    pub total: usize,
    /// Per-node failures; the rest of the pass still applied
    pub failures: Vec<ClusterError>,
}

impl SyncReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Fold the per-node failures into one error, if any
    pub fn error(&self) -> Option<ClusterError> {
        if self.failures.is_empty() {
            return None;
        }

        Some(ClusterError::PartialSync {
            total: self.total,
            errors: self.failures.iter().map(|e| e.to_string()).collect(),
        })
    }
}
