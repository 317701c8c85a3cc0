use super::types::{ClusterError, ClusterResult};
use crate::core::{NodeInfo, Result, SpeedyError};
use crate::sharding::Shard;
use crate::transport::{CacheRpc, Connector};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A cluster member and its outbound connection.
///
/// At most one connection handle exists per node: `refresh_client` reuses
/// a live handle, and `close` tears it down exactly once.
pub struct Node {
    pub id: String,
    pub host: String,
    pub port: u16,
    client: Mutex<Option<Arc<dyn CacheRpc>>>,
    closed: AtomicBool,
}

impl Node {
    pub fn new(info: NodeInfo) -> Self {
        Self {
            id: info.id,
            host: info.host,
            port: info.port,
            client: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn info(&self) -> NodeInfo {
        NodeInfo::new(self.id.clone(), self.host.clone(), self.port)
    }

    pub fn to_shard(&self) -> Shard {
        Shard::new(self.id.clone(), self.host.clone(), self.port)
    }

    /// Current handle without connecting
    pub fn client(&self) -> Option<Arc<dyn CacheRpc>> {
        self.client.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Return the node's handle, connecting first if there is none
    pub async fn refresh_client(&self, connector: &dyn Connector) -> ClusterResult<Arc<dyn CacheRpc>> {
        if self.is_closed() {
            return Err(self.connect_error("node is closed"));
        }
        if let Some(client) = self.client() {
            return Ok(client);
        }

        let fresh = connector
            .connect(&self.host, self.port)
            .await
            .map_err(|e| self.connect_error(e.to_string()))?;

        let mut slot = self.client.lock();
        match slot.as_ref() {
            // Another caller connected while we were dialing
            Some(existing) => Ok(existing.clone()),
            None => {
                debug!("Connected to node {}", self.info());
                *slot = Some(fresh.clone());
                Ok(fresh)
            }
        }
    }

    /// Close the connection handle. Later calls are no-ops.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let client = self.client.lock().take();
        match client {
            Some(client) => client.close().await,
            None => Ok(()),
        }
    }

    /// Connect if needed and hand back the handle as a request-level error
    pub async fn rpc(&self, connector: &dyn Connector) -> Result<Arc<dyn CacheRpc>> {
        self.refresh_client(connector).await.map_err(|e| match e {
            ClusterError::Rpc(inner) => inner,
            other => SpeedyError::Transport(other.to_string()),
        })
    }

    fn connect_error(&self, reason: impl Into<String>) -> ClusterError {
        ClusterError::Connect {
            node: self.id.clone(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected", &self.client.lock().is_some())
            .finish()
    }
}
