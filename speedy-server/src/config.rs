use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cluster::{ClusterConfig, SelectorKind};
use crate::core::{EvictionPolicy, NodeInfo, Result, SpeedyError};
use crate::sharding::AlgorithmType;

/// Node id value that asks the server to discover its own identity
pub const DYNAMIC_NODE_ID: &str = "DYNAMIC";

/// Main server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: Server,
    pub node: NodeConfig,
    pub cache: CacheConfig,
    pub cluster: ClusterConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 15600,
        }
    }
}

/// Identity of this node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node id; absent or `DYNAMIC` means discover it
    pub id: Option<String>,
    /// Election priority override, defaults to the OS process id
    pub pid: Option<u32>,
}

impl NodeConfig {
    pub fn resolve_pid(&self) -> u32 {
        self.pid.unwrap_or_else(std::process::id)
    }

    fn is_dynamic(&self) -> bool {
        match self.id.as_deref() {
            None => true,
            Some(id) => id.is_empty() || id == DYNAMIC_NODE_ID,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub eviction_policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            eviction_policy: EvictionPolicy::Lru,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            SpeedyError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let config: ServerConfig =
            serde_yaml::from_str(&content).map_err(|e| SpeedyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(SpeedyError::Config("cache.capacity must be positive".into()));
        }
        self.cluster.validate()?;
        check_unique_ids(&self.cluster.nodes)
    }

    /// Get server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Work out which member of the cluster this process is.
    ///
    /// A configured id is looked up in `cluster.nodes`; an id that is not
    /// listed describes a new node at this server's port. Without an id,
    /// the member whose host or id equals `hostname` is chosen, and
    /// failing that a fresh `node-xxxxx` id is generated.
    pub fn resolve_node(&self, hostname: Option<&str>) -> NodeInfo {
        let advertised_host = hostname
            .map(str::to_string)
            .unwrap_or_else(|| self.advertised_host());

        if !self.node.is_dynamic() {
            let id = self.node.id.clone().unwrap_or_default();
            return self
                .cluster
                .nodes
                .iter()
                .find(|n| n.id == id)
                .cloned()
                .unwrap_or_else(|| NodeInfo::new(id, advertised_host, self.server.port));
        }

        if let Some(hostname) = hostname {
            if let Some(node) = self
                .cluster
                .nodes
                .iter()
                .find(|n| n.host == hostname || n.id == hostname)
            {
                return node.clone();
            }
        }

        NodeInfo::new(generate_node_id(), advertised_host, self.server.port)
    }

    fn advertised_host(&self) -> String {
        match self.server.host.as_str() {
            "0.0.0.0" | "::" | "" => "127.0.0.1".to_string(),
            host => host.to_string(),
        }
    }
}

/// This machine's hostname, if the OS reports one
pub fn local_hostname() -> Option<String> {
    sys_info::hostname().ok().filter(|h| !h.is_empty())
}

/// `node-` followed by five random characters
pub fn generate_node_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("node-{}", &suffix[..5])
}

fn check_unique_ids(nodes: &[NodeInfo]) -> Result<()> {
    let mut seen = HashSet::new();
    for node in nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(SpeedyError::Config(format!("duplicate node id: {}", node.id)));
        }
    }
    Ok(())
}

/// Request router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Seed nodes
    pub nodes: Vec<NodeInfo>,
    pub algorithm: AlgorithmType,
    pub sync_interval_ms: u64,
    pub node_selector: SelectorKind,
    pub get_timeout_ms: u64,
    pub put_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            algorithm: AlgorithmType::Consistent,
            sync_interval_ms: 2000,
            node_selector: SelectorKind::RoundRobin,
            get_timeout_ms: 3000,
            put_timeout_ms: 5000,
        }
    }
}

impl ClientConfig {
    pub fn new(nodes: Vec<NodeInfo>) -> Self {
        Self {
            nodes,
            ..Default::default()
        }
    }

    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            SpeedyError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let config: ClientConfig =
            serde_yaml::from_str(&content).map_err(|e| SpeedyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("sync_interval_ms", self.sync_interval_ms),
            ("get_timeout_ms", self.get_timeout_ms),
            ("put_timeout_ms", self.put_timeout_ms),
        ] {
            if value == 0 {
                return Err(SpeedyError::Config(format!("{} must be positive", name)));
            }
        }
        check_unique_ids(&self.nodes)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }

    pub fn put_timeout(&self) -> Duration {
        Duration::from_millis(self.put_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_nodes() -> Vec<NodeInfo> {
        vec![
            NodeInfo::new("node-1", "cache-a", 15601),
            NodeInfo::new("node-2", "cache-b", 15602),
            NodeInfo::new("node-3", "cache-c", 15603),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:15600");
        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.cluster.rpc_timeout(), Duration::from_secs(1));
        assert_eq!(config.cluster.election_decision_timeout(), Duration::from_secs(5));
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: ServerConfig = serde_yaml::from_str("cache:\n  capacity: 5\n").unwrap();
        assert_eq!(config.cache.capacity, 5);
        assert_eq!(config.server.port, 15600);
        assert_eq!(config.cluster.heartbeat_interval_ms, 1000);
    }

    #[test]
    fn test_resolve_configured_id() {
        let mut config = ServerConfig::default();
        config.cluster.nodes = three_nodes();
        config.node.id = Some("node-2".into());

        assert_eq!(config.resolve_node(None), three_nodes()[1]);
    }

    #[test]
    fn test_resolve_unlisted_id_uses_server_port() {
        let mut config = ServerConfig::default();
        config.server.port = 16000;
        config.node.id = Some("extra".into());

        let node = config.resolve_node(None);
        assert_eq!(node, NodeInfo::new("extra", "127.0.0.1", 16000));
    }

    #[test]
    fn test_resolve_dynamic_by_hostname() {
        let mut config = ServerConfig::default();
        config.cluster.nodes = three_nodes();
        config.node.id = Some(DYNAMIC_NODE_ID.into());

        assert_eq!(config.resolve_node(Some("cache-c")).id, "node-3");
    }

    #[test]
    fn test_resolve_dynamic_generates_id() {
        let mut config = ServerConfig::default();
        config.cluster.nodes = three_nodes();

        let node = config.resolve_node(Some("elsewhere"));
        assert!(node.id.starts_with("node-"));
        assert_eq!(node.id.len(), 10);
        assert_eq!(node.host, "elsewhere");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut config = ServerConfig::default();
        config.cluster.nodes = vec![
            NodeInfo::new("a", "h1", 1),
            NodeInfo::new("a", "h2", 2),
        ];
        assert!(matches!(config.validate(), Err(SpeedyError::Config(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = ServerConfig::default();
        config.cache.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pid_override() {
        let node = NodeConfig {
            id: None,
            pid: Some(7),
        };
        assert_eq!(node.resolve_pid(), 7);
        assert_eq!(NodeConfig::default().resolve_pid(), std::process::id());
    }

    #[test]
    fn test_client_config_defaults() {
        let config: ClientConfig = serde_yaml::from_str(
            "nodes:\n  - id: n1\n    host: localhost\n    port: 15600\nalgorithm: rendezvous\n",
        )
        .unwrap();

        assert_eq!(config.algorithm, AlgorithmType::Rendezvous);
        assert_eq!(config.get_timeout(), Duration::from_secs(3));
        assert_eq!(config.put_timeout(), Duration::from_secs(5));
        assert_eq!(config.nodes.len(), 1);
    }
}
