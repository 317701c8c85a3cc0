pub mod client;
pub mod cluster;
pub mod config;
pub mod core;
pub mod eviction;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod sharding;
pub mod transport;

// Re-export commonly used types
pub use client::CacheClient;
pub use cluster::{
    ClusterConfig, ClusterError, ClusterSyncer, ElectionCoordinator, NodesConfig, SelectorKind,
    SyncReport,
};
pub use config::{ClientConfig, ServerConfig};
pub use core::{CacheStats, EvictionPolicy, NodeInfo, SpeedyError};
pub use eviction::{EvictionAlgorithm, LruCache};
pub use protocol::{Request, Response};
pub use server::{AppState, CacheService, create_router, init_metrics};
pub use sharding::{AlgorithmType, Shard, ShardingAlgorithm, ShardingError};
pub use transport::{CacheRpc, Connector, HttpConnector, LocalConnector, LocalNetwork};
