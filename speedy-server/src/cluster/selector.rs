//! Peer selection for membership sync

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Selector policy named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    /// One after another through the id list
    #[default]
    RoundRobin,
    /// Uniformly random
    Random,
}

/// Picks which peer to ask for its view of the cluster
pub trait NodeSelector: Send + Sync {
    /// Index into `ids`, `None` when `ids` is empty
    fn select(&self, ids: &[String]) -> Option<usize>;
}

/// Walks the id list in order. The cursor belongs to the selector instance.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl NodeSelector for RoundRobinSelector {
    fn select(&self, ids: &[String]) -> Option<usize> {
        if ids.is_empty() {
            return None;
        }
        Some(self.next.fetch_add(1, Ordering::Relaxed) % ids.len())
    }
}

#[derive(Debug, Default)]
pub struct RandomSelector;

impl NodeSelector for RandomSelector {
    fn select(&self, ids: &[String]) -> Option<usize> {
        if ids.is_empty() {
            return None;
        }
        Some(rand::rng().random_range(0..ids.len()))
    }
}

pub fn new_selector(kind: SelectorKind) -> Box<dyn NodeSelector> {
    match kind {
        SelectorKind::RoundRobin => Box::new(RoundRobinSelector::default()),
        SelectorKind::Random => Box::new(RandomSelector),
    }
}
