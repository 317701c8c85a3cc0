//! Request router - sends each key to the node that owns it

use crate::cluster::{ClusterError, ClusterResult, ClusterSyncer, NodesConfig, SyncReport};
use crate::config::ClientConfig;
use crate::core::{NodeInfo, Result, SpeedyError};
use crate::sharding::{self, AlgorithmType, SharedAlgorithm, Shard};
use crate::transport::{CacheRpc, Connector};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cluster-aware cache client.
///
/// Keeps its own membership view and shard table; `start_sync` keeps both
/// current in the background.
pub struct CacheClient {
    membership: Arc<NodesConfig>,
    shards: SharedAlgorithm,
    config: ClientConfig,
}

impl CacheClient {
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let shards = sharding::shared(sharding::new_algorithm(
            config.algorithm,
            config.nodes.iter().map(Shard::from).collect(),
            sharding::default_hash(),
        ));
        let membership = Arc::new(
            NodesConfig::new(
                config.nodes.clone(),
                connector,
                config.node_selector,
                config.get_timeout(),
            )
            .with_shards(shards.clone()),
        );

        Self {
            membership,
            shards,
            config,
        }
    }

    pub fn algorithm(&self) -> AlgorithmType {
        self.config.algorithm
    }

    pub fn membership(&self) -> &Arc<NodesConfig> {
        &self.membership
    }

    /// Known nodes in membership order
    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.membership.infos()
    }

    /// Shard that owns `key` under the current table
    pub fn shard_for(&self, key: &str) -> Option<Shard> {
        self.shards.read().get_shard(key)
    }

    /// Resolve the owner of `key` and its connection. A shard whose node
    /// is gone from membership, or cannot be reached, is unavailable.
    async fn route(&self, key: &str) -> Result<(Shard, Arc<dyn CacheRpc>)> {
        let shard = self.shard_for(key).ok_or(SpeedyError::NoShards)?;
        let shard_id = shard.id.clone();
        let unavailable = || SpeedyError::ShardUnavailable {
            shard: shard_id.clone(),
            key: key.to_string(),
        };

        let Some(node) = self.membership.get_node(&shard.id) else {
            debug!("Shard {} has no member entry", shard.id);
            return Err(unavailable());
        };

        match node.rpc(self.membership.connector()).await {
            Ok(client) => Ok((shard, client)),
            Err(e) => {
                debug!("Shard {} unreachable: {}", shard.id, e);
                Err(unavailable())
            }
        }
    }

    /// Fetch a value. Unreachable or stale owners surface as
    /// `ShardUnavailable`, which counts as a cache miss.
    pub async fn get(&self, key: &str) -> Result<String> {
        let (shard, client) = match self.route(key).await {
            Ok(routed) => routed,
            Err(e) => {
                crate::metrics::record_client_request("get", "unavailable");
                return Err(e);
            }
        };

        let result = match timeout(self.config.get_timeout(), client.get(key)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(SpeedyError::KeyNotFound(k))) => Err(SpeedyError::KeyNotFound(k)),
            Ok(Err(e)) => {
                warn!("Get {} from {} failed: {}", key, shard.id, e);
                Err(SpeedyError::ShardUnavailable {
                    shard: shard.id,
                    key: key.to_string(),
                })
            }
            Err(_) => Err(SpeedyError::ShardUnavailable {
                shard: shard.id,
                key: key.to_string(),
            }),
        };

        let status = match &result {
            Ok(_) => "hit",
            Err(SpeedyError::KeyNotFound(_)) => "miss",
            Err(_) => "unavailable",
        };
        crate::metrics::record_client_request("get", status);
        result
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        let (shard, client) = self.route(key).await?;

        let result = timeout(self.config.put_timeout(), client.put(key, value))
            .await
            .map_err(|_| SpeedyError::Timeout(format!("put {} on {}", key, shard.id)))
            .and_then(|r| r);

        crate::metrics::record_client_request("put", if result.is_ok() { "ok" } else { "error" });
        result
    }

    /// Sum of `len` across reachable nodes; unreachable nodes are skipped
    pub async fn len_total(&self) -> u64 {
        let nodes = self.membership.nodes();
        let counts = nodes.iter().map(|node| async move {
            let client = node.rpc(self.membership.connector()).await?;
            timeout(self.config.get_timeout(), client.len())
                .await
                .map_err(|_| SpeedyError::Timeout(format!("len on {}", node.id)))?
        });

        let mut total = 0u64;
        for (node, result) in nodes.iter().zip(join_all(counts).await) {
            match result {
                Ok(len) => total += u64::from(len),
                Err(e) => warn!("Skipping {} in len: {}", node.id, e),
            }
        }
        total
    }

    /// Run one sync pass now
    pub async fn sync_now(&self) -> ClusterResult<SyncReport> {
        self.syncer().sync_once().await
    }

    /// Start background sync until `token` is cancelled
    pub fn start_sync(&self, token: CancellationToken) -> (JoinHandle<()>, mpsc::Receiver<ClusterError>) {
        self.syncer().start(token)
    }

    fn syncer(&self) -> ClusterSyncer {
        ClusterSyncer::new(
            self.membership.clone(),
            self.shards.clone(),
            self.config.sync_interval(),
        )
    }

    /// Close every node connection
    pub async fn close(&self) {
        self.membership.close_all().await;
    }
}
