//! Eviction cache - bounded in-memory stores held by every node

pub mod lru;

pub use lru::LruCache;

use crate::core::{CacheStats, EvictionPolicy};

/// Capacity-bounded key/value store.
///
/// Operations never fail: a miss is reported through `None`, and an insert
/// past capacity evicts according to the algorithm before returning.
pub trait EvictionAlgorithm: Send + Sync {
    /// Look up a key, counting as an access for recency purposes
    fn get(&self, key: &str) -> Option<String>;

    /// Insert or update a key
    fn put(&self, key: String, value: String);

    /// Current number of entries
    fn len(&self) -> u32;

    /// Whether the store holds no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of hit/miss/eviction counters
    fn stats(&self) -> CacheStats;
}

/// Build the eviction algorithm selected by `policy`
pub fn new_algorithm(policy: EvictionPolicy, capacity: usize) -> Box<dyn EvictionAlgorithm> {
    match policy {
        EvictionPolicy::Lru => Box::new(LruCache::new(capacity)),
    }
}
