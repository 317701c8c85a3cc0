//! Cache node service - the RPC surface every transport dispatches into

use crate::cluster::{ClusterError, ElectionCoordinator, ElectionSettings, NodesConfig, SyncReport};
use crate::config::ServerConfig;
use crate::core::{CacheStats, NodeInfo, Result, SpeedyError};
use crate::eviction::{self, EvictionAlgorithm};
use crate::transport::Connector;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One cache node: its local store, its view of the cluster and its
/// election state.
pub struct CacheService {
    node: NodeInfo,
    cache: Box<dyn EvictionAlgorithm>,
    membership: Arc<NodesConfig>,
    election: Arc<ElectionCoordinator>,
    rpc_timeout: Duration,
}

impl CacheService {
    pub fn new(
        node: NodeInfo,
        cache: Box<dyn EvictionAlgorithm>,
        membership: Arc<NodesConfig>,
        election: Arc<ElectionCoordinator>,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            node,
            cache,
            membership,
            election,
            rpc_timeout,
        }
    }

    /// Wire up a node from configuration. `node` must already be resolved
    /// and is added to the initial membership if the file omits it.
    pub fn from_config(config: &ServerConfig, node: NodeInfo, connector: Arc<dyn Connector>) -> Self {
        let mut nodes = config.cluster.nodes.clone();
        if !nodes.iter().any(|n| n.id == node.id) {
            nodes.push(node.clone());
        }

        let rpc_timeout = config.cluster.rpc_timeout();
        let membership = Arc::new(NodesConfig::new(
            nodes,
            connector,
            config.cluster.node_selector,
            rpc_timeout,
        ));
        let election = Arc::new(ElectionCoordinator::new(
            node.id.clone(),
            config.node.resolve_pid(),
            membership.clone(),
            ElectionSettings::from(&config.cluster),
        ));
        let cache = eviction::new_algorithm(config.cache.eviction_policy, config.cache.capacity);

        info!(
            "Cache node {} ready (capacity {}, {} members)",
            node,
            config.cache.capacity,
            membership.len()
        );
        Self::new(node, cache, membership, election, rpc_timeout)
    }

    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    pub fn membership(&self) -> &Arc<NodesConfig> {
        &self.membership
    }

    pub fn election(&self) -> &Arc<ElectionCoordinator> {
        &self.election
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn get(&self, key: &str) -> Result<String> {
        let value = self.cache.get(key);
        crate::metrics::record_cache_op("get", if value.is_some() { "hit" } else { "miss" });
        value.ok_or_else(|| SpeedyError::KeyNotFound(key.to_string()))
    }

    pub fn put(&self, key: String, value: String) {
        self.cache.put(key, value);
        crate::metrics::record_cache_op("put", "ok");
        crate::metrics::update_cache_stats(&self.node.id, &self.cache.stats());
    }

    pub fn len(&self) -> u32 {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn cluster_config(&self) -> Vec<NodeInfo> {
        self.membership.infos()
    }

    /// Replace membership with `nodes`. This node always stays a member of
    /// its own view.
    pub async fn update_cluster_config(&self, mut nodes: Vec<NodeInfo>) -> SyncReport {
        if !nodes.iter().any(|n| n.id == self.node.id) {
            nodes.push(self.node.clone());
        }

        let report = self.membership.sync_states(&nodes).await;
        if let Some(e) = report.error() {
            warn!("Cluster config update applied partially: {}", e);
        }
        report
    }

    /// Idempotent join. A new member is pushed to every other peer.
    pub async fn register_node_with_cluster(&self, node: NodeInfo) -> Result<()> {
        if self.membership.contains(&node.id) {
            debug!("Node {} already registered", node.id);
            return Ok(());
        }

        match self.membership.add_node(node.clone()).await {
            Ok(_) => {}
            Err(ClusterError::NodeExists(_)) => return Ok(()),
            Err(e) => return Err(SpeedyError::Transport(e.to_string())),
        }

        info!("Node {} joined via {}", node, self.node.id);
        self.election.push_cluster_config().await;
        Ok(())
    }

    pub fn get_pid(&self, caller_pid: u32) -> u32 {
        debug!("PID probe from {}", caller_pid);
        self.election.pid()
    }

    /// Start a local election in the background and acknowledge at once
    pub fn request_election(&self, caller_pid: u32, caller_id: &str) {
        info!("Election requested by {} (pid {})", caller_id, caller_pid);

        // Detached: bounded by the election's own timeouts
        let election = Arc::clone(&self.election);
        tokio::spawn(async move {
            election.run_election().await;
        });
    }

    pub fn update_leader(&self, leader_id: &str) {
        self.election.update_leader(leader_id);
    }

    pub fn heartbeat(&self, caller_id: &str) {
        debug!("Heartbeat from {}", caller_id);
    }

    pub fn leader(&self) -> Result<String> {
        self.election.leader().ok_or(SpeedyError::LeaderNotFound)
    }

    /// Known leader, electing one first when none is recorded. Gives up
    /// with `LeaderNotFound` after the election decision timeout.
    pub async fn get_leader(&self) -> Result<String> {
        if let Some(leader) = self.election.leader() {
            return Ok(leader);
        }

        // The election runs in its own task so an expired wait never drops
        // it half way through.
        let token = CancellationToken::new();
        let election = Arc::clone(&self.election);
        let task_token = token.clone();
        let mut task = tokio::spawn(async move { election.get_leader(&task_token).await });

        let wait = self.election.settings().decision_timeout;
        let result = match timeout(wait, &mut task).await {
            Ok(joined) => joined.map_err(|e| SpeedyError::Internal(e.to_string()))?,
            Err(_) => {
                warn!("No leader elected within {:?}", wait);
                Err(SpeedyError::LeaderNotFound)
            }
        };
        token.cancel();
        result
    }

    /// Announce this node to every peer in its initial membership
    pub async fn register_with_cluster(&self) {
        let peers = self.membership.peers(&self.node.id);
        let joins = peers.iter().map(|peer| async move {
            let client = peer.rpc(self.membership.connector()).await?;
            timeout(self.rpc_timeout, client.register_node_with_cluster(self.node.clone()))
                .await
                .map_err(|_| SpeedyError::Timeout(format!("register with {}", peer.id)))?
        });

        for (peer, result) in peers.iter().zip(join_all(joins).await) {
            match result {
                Ok(()) => info!("Registered with {}", peer.id),
                Err(e) => warn!("Failed to register with {}: {}", peer.id, e),
            }
        }
    }

    /// Stop background work and close every peer connection
    pub async fn shutdown(&self) {
        self.election.shutdown();
        self.membership.close_all().await;
        info!("Cache node {} shut down", self.node.id);
    }
}
