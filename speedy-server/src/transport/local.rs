use super::{CacheRpc, Connector};
use crate::core::{NodeInfo, Result, SpeedyError};
use crate::server::CacheService;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-process registry of cache nodes keyed by `host:port`.
///
/// Nodes can be taken down and brought back to simulate failures without
/// sockets.
#[derive(Default)]
pub struct LocalNetwork {
    services: RwLock<HashMap<String, Arc<CacheService>>>,
    down: RwLock<HashSet<String>>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, service: Arc<CacheService>) {
        let address = service.node().address();
        self.services.write().insert(address, service);
    }

    pub fn take_down(&self, address: &str) {
        self.down.write().insert(address.to_string());
    }

    pub fn bring_up(&self, address: &str) {
        self.down.write().remove(address);
    }

    pub fn is_down(&self, address: &str) -> bool {
        self.down.read().contains(address)
    }

    pub fn service(&self, address: &str) -> Option<Arc<CacheService>> {
        self.services.read().get(address).cloned()
    }

    fn route(&self, address: &str) -> Result<Arc<CacheService>> {
        if self.is_down(address) {
            return Err(SpeedyError::Transport(format!("{} is down", address)));
        }
        self.service(address)
            .ok_or_else(|| SpeedyError::Transport(format!("connection refused: {}", address)))
    }
}

/// Builds [`LocalClient`] handles on a [`LocalNetwork`]
#[derive(Clone)]
pub struct LocalConnector {
    network: Arc<LocalNetwork>,
}

impl LocalConnector {
    pub fn new(network: Arc<LocalNetwork>) -> Self {
        Self { network }
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn CacheRpc>> {
        Ok(Arc::new(LocalClient {
            network: self.network.clone(),
            address: format!("{}:{}", host, port),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Connection handle that calls the target service directly. Each call
/// resolves the address, so a node that was taken down fails until it is
/// brought back.
pub struct LocalClient {
    network: Arc<LocalNetwork>,
    address: String,
    closed: AtomicBool,
}

impl LocalClient {
    fn target(&self) -> Result<Arc<CacheService>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SpeedyError::Transport("connection closed".to_string()));
        }
        self.network.route(&self.address)
    }
}

#[async_trait]
impl CacheRpc for LocalClient {
    async fn get(&self, key: &str) -> Result<String> {
        self.target()?.get(key)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.target()?.put(key.to_string(), value.to_string());
        Ok(())
    }

    async fn len(&self) -> Result<u32> {
        Ok(self.target()?.len())
    }

    async fn get_cluster_config(&self) -> Result<Vec<NodeInfo>> {
        Ok(self.target()?.cluster_config())
    }

    async fn update_cluster_config(&self, nodes: Vec<NodeInfo>) -> Result<()> {
        self.target()?.update_cluster_config(nodes).await;
        Ok(())
    }

    async fn register_node_with_cluster(&self, node: NodeInfo) -> Result<()> {
        self.target()?.register_node_with_cluster(node).await
    }

    async fn get_pid(&self, caller_pid: u32) -> Result<u32> {
        Ok(self.target()?.get_pid(caller_pid))
    }

    async fn request_election(&self, caller_pid: u32, caller_id: &str) -> Result<()> {
        self.target()?.request_election(caller_pid, caller_id);
        Ok(())
    }

    async fn update_leader(&self, leader_id: &str) -> Result<()> {
        self.target()?.update_leader(leader_id);
        Ok(())
    }

    async fn get_heartbeat(&self, caller_id: &str) -> Result<()> {
        self.target()?.heartbeat(caller_id);
        Ok(())
    }

    async fn get_leader(&self) -> Result<String> {
        self.target()?.get_leader().await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(SpeedyError::Transport("connection already closed".to_string()));
        }
        Ok(())
    }
}
