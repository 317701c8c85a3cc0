//! Membership store - the node map every sync pass reconciles

use super::diff::{NodeState, diff};
use super::node::Node;
use super::selector::{NodeSelector, SelectorKind, new_selector};
use super::types::{ClusterError, ClusterResult, SyncReport};
use crate::core::NodeInfo;
use crate::sharding::{SharedAlgorithm, Shard, ShardingError};
use crate::transport::Connector;
use futures_util::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Map and ordered id list; the id list and the map keys are always the
/// same set.
#[derive(Default)]
struct Members {
    nodes: HashMap<String, Arc<Node>>,
    ids: Vec<String>,
}

/// Cluster membership as seen by one process
pub struct NodesConfig {
    members: RwLock<Members>,
    connector: Arc<dyn Connector>,
    selector: Box<dyn NodeSelector>,
    /// Routing table kept in step with Added/Removed entries
    shards: Option<SharedAlgorithm>,
    fetch_timeout: Duration,
}

impl NodesConfig {
    /// Seed membership from a static node list. Later duplicates of an id
    /// are ignored.
    pub fn new(
        initial: Vec<NodeInfo>,
        connector: Arc<dyn Connector>,
        selector: SelectorKind,
        fetch_timeout: Duration,
    ) -> Self {
        let mut members = Members::default();
        for info in initial {
            if members.nodes.contains_key(&info.id) {
                warn!("Duplicate node id in initial config: {}", info.id);
                continue;
            }
            members.ids.push(info.id.clone());
            members.nodes.insert(info.id.clone(), Arc::new(Node::new(info)));
        }

        Self {
            members: RwLock::new(members),
            connector,
            selector: new_selector(selector),
            shards: None,
            fetch_timeout,
        }
    }

    /// Keep `shards` updated as nodes are added and removed
    pub fn with_shards(mut self, shards: SharedAlgorithm) -> Self {
        self.shards = Some(shards);
        self
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    pub fn get_node(&self, id: &str) -> Option<Arc<Node>> {
        self.members.read().nodes.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.read().nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.members.read().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids in insertion order
    pub fn ids(&self) -> Vec<String> {
        self.members.read().ids.clone()
    }

    /// Nodes in id-list order
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        let members = self.members.read();
        members
            .ids
            .iter()
            .filter_map(|id| members.nodes.get(id).cloned())
            .collect()
    }

    /// Nodes other than `self_id`
    pub fn peers(&self, self_id: &str) -> Vec<Arc<Node>> {
        self.nodes().into_iter().filter(|n| n.id != self_id).collect()
    }

    pub fn infos(&self) -> Vec<NodeInfo> {
        self.nodes().iter().map(|n| n.info()).collect()
    }

    pub fn get_shards(&self) -> Vec<Shard> {
        self.nodes().iter().map(|n| n.to_shard()).collect()
    }

    /// Fetch a peer's view of the cluster and reconcile against it.
    ///
    /// The peer comes from the node selector. Per-node failures are
    /// collected in the report; `changed` is set when anything applied.
    pub async fn sync(&self) -> ClusterResult<SyncReport> {
        let node = {
            let members = self.members.read();
            let idx = self
                .selector
                .select(&members.ids)
                .ok_or(ClusterError::NoNodeSelected)?;
            members
                .nodes
                .get(&members.ids[idx])
                .cloned()
                .ok_or_else(|| ClusterError::NodeNotFound(members.ids[idx].clone()))?
        };

        let client = node.refresh_client(self.connector.as_ref()).await?;
        let desired = tokio::time::timeout(self.fetch_timeout, client.get_cluster_config())
            .await
            .map_err(|_| {
                ClusterError::Rpc(crate::core::SpeedyError::Timeout(format!(
                    "cluster config from {}",
                    node.id
                )))
            })??;

        debug!("Fetched {} nodes from {}", desired.len(), node.id);
        Ok(self.sync_states(&desired).await)
    }

    /// Reconcile membership against `desired`, applying every diff entry
    /// concurrently.
    pub async fn sync_states(&self, desired: &[NodeInfo]) -> SyncReport {
        let current = self.infos();
        let diffs = diff(&current, desired);
        let total = diffs.len();

        let tasks = diffs.into_values().map(|entry| async move {
            match entry.state {
                NodeState::Added => self.add_node(entry.node).await.map(|_| true),
                NodeState::Removed => self.remove_node(&entry.node.id).await.map(|_| true),
                NodeState::Synced => {
                    debug!("Node {} already synced", entry.node.id);
                    Ok(false)
                }
            }
        });

        let mut report = SyncReport {
            total,
            ..Default::default()
        };
        for result in join_all(tasks).await {
            match result {
                Ok(applied) => report.changed |= applied,
                Err(e) => {
                    error!("Failed to apply node diff: {}", e);
                    report.failures.push(e);
                }
            }
        }

        if report.changed {
            crate::metrics::set_cluster_members(self.len());
        }
        report
    }

    /// Add a node, connecting to it before it becomes visible
    pub async fn add_node(&self, info: NodeInfo) -> ClusterResult<Arc<Node>> {
        if self.contains(&info.id) {
            return Err(ClusterError::NodeExists(info.id));
        }

        let node = Arc::new(Node::new(info));
        node.refresh_client(self.connector.as_ref()).await?;

        let inserted = {
            let mut members = self.members.write();
            if members.nodes.contains_key(&node.id) {
                false
            } else {
                members.ids.push(node.id.clone());
                members.nodes.insert(node.id.clone(), node.clone());
                true
            }
        };

        if !inserted {
            // Lost the race against a concurrent add of the same id
            if let Err(e) = node.close().await {
                warn!("Failed to close connection to {}: {}", node.id, e);
            }
            return Err(ClusterError::NodeExists(node.id.clone()));
        }

        if let Some(shards) = &self.shards {
            match shards.write().register_shard(node.to_shard()) {
                Ok(()) | Err(ShardingError::AlreadyRegistered(_)) => {}
                Err(e) => warn!("Failed to register shard {}: {}", node.id, e),
            }
        }

        info!("Node {} added to cluster", node.info());
        Ok(node)
    }

    /// Remove a node and close its connection
    pub async fn remove_node(&self, id: &str) -> ClusterResult<Arc<Node>> {
        let node = {
            let mut members = self.members.write();
            let node = members
                .nodes
                .remove(id)
                .ok_or_else(|| ClusterError::NodeNotFound(id.to_string()))?;
            members.ids.retain(|existing| existing != id);
            node
        };

        if let Err(e) = node.close().await {
            warn!("Failed to close connection to {}: {}", id, e);
        }

        if let Some(shards) = &self.shards {
            match shards.write().delete_shard(&node.to_shard()) {
                Ok(()) | Err(ShardingError::NotFound(_)) => {}
                Err(e) => warn!("Failed to delete shard {}: {}", id, e),
            }
        }

        info!("Node {} removed from cluster", node.info());
        Ok(node)
    }

    /// Close every connection; used at shutdown
    pub async fn close_all(&self) {
        for node in self.nodes() {
            if let Err(e) = node.close().await {
                warn!("Failed to close connection to {}: {}", node.id, e);
            }
        }
    }
}
