//! Transport boundary - how a node or client reaches its peers
//!
//! Everything above this module talks to other nodes through [`CacheRpc`]
//! handles obtained from a [`Connector`]. Two implementations ship:
//! HTTP command envelopes (`http`) and an in-process registry (`local`).

pub mod http;
pub mod local;

pub use http::{HttpClient, HttpConnector};
pub use local::{LocalConnector, LocalNetwork};

use crate::core::{NodeInfo, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Outbound RPC surface of one cache node
#[async_trait]
pub trait CacheRpc: Send + Sync {
    /// Fetch a value; a miss is `SpeedyError::KeyNotFound`
    async fn get(&self, key: &str) -> Result<String>;

    async fn put(&self, key: &str, value: &str) -> Result<()>;

    async fn len(&self) -> Result<u32>;

    /// Peer's view of cluster membership
    async fn get_cluster_config(&self) -> Result<Vec<NodeInfo>>;

    /// Replace the peer's membership wholesale
    async fn update_cluster_config(&self, nodes: Vec<NodeInfo>) -> Result<()>;

    /// Idempotent join
    async fn register_node_with_cluster(&self, node: NodeInfo) -> Result<()>;

    /// PID probe; returns the peer's own pid
    async fn get_pid(&self, caller_pid: u32) -> Result<u32>;

    /// Ask the peer to run an election of its own
    async fn request_election(&self, caller_pid: u32, caller_id: &str) -> Result<()>;

    async fn update_leader(&self, leader_id: &str) -> Result<()>;

    async fn get_heartbeat(&self, caller_id: &str) -> Result<()>;

    /// Leader id known to the peer, which runs an election first when it
    /// has none. `LeaderNotFound` when no leader emerges in time.
    async fn get_leader(&self) -> Result<String>;

    /// Release the connection
    async fn close(&self) -> Result<()>;
}

/// Factory for connection handles
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn CacheRpc>>;
}
