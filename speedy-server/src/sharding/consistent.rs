use super::{AlgorithmType, HashFn, Shard, ShardingAlgorithm, ShardingError, ShardingResult};
use std::collections::HashMap;

/// Prefix mixed into a shard id before hashing it onto the ring
const RING_PREFIX: &str = "node";

/// Consistent hashing ring.
///
/// Every shard holds one position `hash("node" + id)`. A key belongs to the
/// first position at or after `hash(key)`, wrapping to the smallest
/// position. Adding a shard only moves keys onto the new shard.
pub struct Consistent {
    /// Sorted ascending
    ring: Vec<u32>,
    owners: HashMap<u32, Shard>,
    positions: HashMap<String, u32>,
    hash: HashFn,
}

impl Consistent {
    pub fn new(hash: HashFn) -> Self {
        Self {
            ring: Vec::new(),
            owners: HashMap::new(),
            positions: HashMap::new(),
            hash,
        }
    }

    fn ring_position(&self, id: &str) -> u32 {
        (self.hash)(&format!("{}{}", RING_PREFIX, id))
    }

    /// Ring positions in ascending order
    pub fn ring(&self) -> &[u32] {
        &self.ring
    }
}

impl ShardingAlgorithm for Consistent {
    fn get_shard(&self, key: &str) -> Option<Shard> {
        if self.ring.is_empty() {
            return None;
        }

        let hash = (self.hash)(key);
        let idx = self.ring.partition_point(|&pos| pos < hash) % self.ring.len();
        self.owners.get(&self.ring[idx]).cloned()
    }

    fn register_shard(&mut self, shard: Shard) -> ShardingResult<()> {
        if self.positions.contains_key(&shard.id) {
            return Err(ShardingError::AlreadyRegistered(shard.id));
        }

        let pos = self.ring_position(&shard.id);
        let idx = match self.ring.binary_search(&pos) {
            // Two ids landing on one position cannot both own it
            Ok(_) => return Err(ShardingError::AlreadyRegistered(shard.id)),
            Err(idx) => idx,
        };

        self.ring.insert(idx, pos);
        self.positions.insert(shard.id.clone(), pos);
        self.owners.insert(pos, shard);
        Ok(())
    }

    fn delete_shard(&mut self, shard: &Shard) -> ShardingResult<()> {
        let pos = self
            .positions
            .remove(&shard.id)
            .ok_or_else(|| ShardingError::NotFound(shard.id.clone()))?;

        if let Ok(idx) = self.ring.binary_search(&pos) {
            self.ring.remove(idx);
        }
        self.owners.remove(&pos);
        Ok(())
    }

    fn shards(&self) -> Vec<Shard> {
        self.ring
            .iter()
            .filter_map(|pos| self.owners.get(pos).cloned())
            .collect()
    }

    fn kind(&self) -> AlgorithmType {
        AlgorithmType::Consistent
    }

    fn len(&self) -> usize {
        self.ring.len()
    }
}
