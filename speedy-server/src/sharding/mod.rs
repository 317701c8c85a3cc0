//! Sharding - deterministic mapping from keys to cache nodes
//!
//! Three interchangeable strategies behind one trait:
//! - Naive: `hash(key) mod n`, cheap but remaps most keys on change
//! - Rendezvous: highest `hash(key + shard_id)` wins, O(n) lookup
//! - Consistent: nearest clockwise ring position, O(log n) lookup

pub mod consistent;
pub mod hash;
pub mod naive;
pub mod rendezvous;

pub use consistent::Consistent;
pub use hash::{HashFn, crc32_hash, default_hash};
pub use naive::Naive;
pub use rendezvous::Rendezvous;

use crate::core::NodeInfo;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// Routable descriptor of a cache node. Uniqueness is by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shard {
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl Shard {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
        }
    }
}

impl From<&NodeInfo> for Shard {
    fn from(node: &NodeInfo) -> Self {
        Self::new(node.id.clone(), node.host.clone(), node.port)
    }
}

/// Sharding error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShardingError {
    #[error("Shard already registered: {0}")]
    AlreadyRegistered(String),
    #[error("Shard not found: {0}")]
    NotFound(String),
    #[error("Unknown sharding algorithm: {0}")]
    UnknownAlgorithm(String),
}

/// Sharding result type
pub type ShardingResult<T> = Result<T, ShardingError>;

/// Sharding strategy selected at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmType {
    Naive,
    Rendezvous,
    #[default]
    Consistent,
}

impl AlgorithmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Rendezvous => "rendezvous",
            Self::Consistent => "consistent",
        }
    }
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmType {
    type Err = ShardingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "naive" => Ok(Self::Naive),
            "rendezvous" => Ok(Self::Rendezvous),
            "consistent" => Ok(Self::Consistent),
            other => Err(ShardingError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Common contract of the sharding strategies.
///
/// `register_shard` rejects an id that is already present and
/// `delete_shard` rejects an id that is absent; neither silently no-ops.
pub trait ShardingAlgorithm: Send + Sync {
    /// Owning shard for `key`, `None` when no shard is registered
    fn get_shard(&self, key: &str) -> Option<Shard>;

    /// Add a shard
    fn register_shard(&mut self, shard: Shard) -> ShardingResult<()>;

    /// Remove a shard
    fn delete_shard(&mut self, shard: &Shard) -> ShardingResult<()>;

    /// Deterministic-order snapshot of all registered shards
    fn shards(&self) -> Vec<Shard>;

    /// Which strategy this is
    fn kind(&self) -> AlgorithmType;

    fn len(&self) -> usize {
        self.shards().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sharding table shared between the request path and the syncer
pub type SharedAlgorithm = Arc<RwLock<Box<dyn ShardingAlgorithm>>>;

/// Build a sharding algorithm of the given type seeded with `shards`.
///
/// Duplicate ids in `shards` are logged and skipped.
pub fn new_algorithm(
    kind: AlgorithmType,
    shards: Vec<Shard>,
    hash: HashFn,
) -> Box<dyn ShardingAlgorithm> {
    let mut algo: Box<dyn ShardingAlgorithm> = match kind {
        AlgorithmType::Naive => Box::new(Naive::new(hash)),
        AlgorithmType::Rendezvous => Box::new(Rendezvous::new(hash)),
        AlgorithmType::Consistent => Box::new(Consistent::new(hash)),
    };

    for shard in shards {
        if let Err(e) = algo.register_shard(shard) {
            error!("Skipping initial shard: {}", e);
        }
    }

    info!("Initialized {} sharding with {} shards", kind, algo.len());
    algo
}

/// Wrap an algorithm for sharing across tasks
pub fn shared(algo: Box<dyn ShardingAlgorithm>) -> SharedAlgorithm {
    Arc::new(RwLock::new(algo))
}

/// Outcome of a `sync_shards` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardSyncReport {
    pub added: usize,
    pub removed: usize,
}

impl ShardSyncReport {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

/// Reconcile `algo` against the desired shard set.
///
/// Deletes every registered shard absent from `desired`, then registers
/// every desired shard. `AlreadyRegistered` and `NotFound` are expected
/// races during best-effort reconciliation and are only logged.
pub fn sync_shards(algo: &mut dyn ShardingAlgorithm, desired: &[Shard]) -> ShardSyncReport {
    let desired_ids: HashSet<&str> = desired.iter().map(|s| s.id.as_str()).collect();
    let mut report = ShardSyncReport::default();

    for shard in algo.shards() {
        if desired_ids.contains(shard.id.as_str()) {
            continue;
        }

        match algo.delete_shard(&shard) {
            Ok(()) => {
                info!("Removed shard {} from {} table", shard.id, algo.kind());
                report.removed += 1;
            }
            Err(ShardingError::NotFound(id)) => debug!("Shard {} already gone", id),
            Err(e) => error!("Failed to delete shard: {}", e),
        }
    }

    for shard in desired {
        match algo.register_shard(shard.clone()) {
            Ok(()) => {
                info!("Registered shard {} in {} table", shard.id, algo.kind());
                report.added += 1;
            }
            Err(ShardingError::AlreadyRegistered(_)) => {}
            Err(e) => error!("Failed to register shard: {}", e),
        }
    }

    report
}
