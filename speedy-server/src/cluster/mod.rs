//! Cluster mode - membership, reconciliation and leader election
//!
//! - Membership store with diff-based reconciliation
//! - Client-side periodic syncer
//! - Bully leader election with a heartbeat monitor

pub mod config;
pub mod diff;
pub mod election;
pub mod membership;
pub mod node;
pub mod selector;
pub mod syncer;
pub mod types;

pub use config::ClusterConfig;
pub use diff::{NodeDiff, NodeState, diff};
pub use election::{ElectionCoordinator, ElectionSettings, outranks};
pub use membership::NodesConfig;
pub use node::Node;
pub use selector::{NodeSelector, RandomSelector, RoundRobinSelector, SelectorKind};
pub use syncer::ClusterSyncer;
pub use types::{ClusterError, ClusterResult, SyncReport};

#[cfg(test)]
mod tests;
