use super::selector::SelectorKind;
use crate::core::{NodeInfo, Result, SpeedyError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Initial membership, including this node
    pub nodes: Vec<NodeInfo>,

    /// Timeout for probes, heartbeats and announcements (milliseconds)
    pub rpc_timeout_ms: u64,

    /// Leader heartbeat monitor tick (milliseconds)
    pub heartbeat_interval_ms: u64,

    /// How often `get_leader` re-checks while no leader is known (milliseconds)
    pub election_poll_interval_ms: u64,

    /// Client-side membership sync period (milliseconds)
    pub sync_interval_ms: u64,

    /// Peer selection policy for membership sync
    pub node_selector: SelectorKind,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            rpc_timeout_ms: 1000,
            heartbeat_interval_ms: 1000,
            election_poll_interval_ms: 3000,
            sync_interval_ms: 2000,
            node_selector: SelectorKind::RoundRobin,
        }
    }
}

impl ClusterConfig {
    /// Every timeout and period must be positive; tokio intervals reject 0
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("rpc_timeout_ms", self.rpc_timeout_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("election_poll_interval_ms", self.election_poll_interval_ms),
            ("sync_interval_ms", self.sync_interval_ms),
        ] {
            if value == 0 {
                return Err(SpeedyError::Config(format!("cluster.{} must be positive", name)));
            }
        }
        Ok(())
    }

    /// Get RPC timeout as Duration
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Get election poll interval as Duration
    pub fn election_poll_interval(&self) -> Duration {
        Duration::from_millis(self.election_poll_interval_ms)
    }

    /// Get sync interval as Duration
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// How long a deferring node waits for an election decision
    pub fn election_decision_timeout(&self) -> Duration {
        self.rpc_timeout() * 5
    }
}
