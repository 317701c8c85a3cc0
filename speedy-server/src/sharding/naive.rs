use super::{AlgorithmType, HashFn, Shard, ShardingAlgorithm, ShardingError, ShardingResult};

/// Modulo sharding: `shards[hash(key) % n]`.
///
/// Adding or removing a shard remaps most keys.
pub struct Naive {
    shards: Vec<Shard>,
    hash: HashFn,
}

impl Naive {
    pub fn new(hash: HashFn) -> Self {
        Self {
            shards: Vec::new(),
            hash,
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.shards.iter().position(|s| s.id == id)
    }
}

impl ShardingAlgorithm for Naive {
    fn get_shard(&self, key: &str) -> Option<Shard> {
        if self.shards.is_empty() {
            return None;
        }

        let idx = (self.hash)(key) as usize % self.shards.len();
        Some(self.shards[idx].clone())
    }

    fn register_shard(&mut self, shard: Shard) -> ShardingResult<()> {
        if self.position(&shard.id).is_some() {
            return Err(ShardingError::AlreadyRegistered(shard.id));
        }

        self.shards.push(shard);
        Ok(())
    }

    fn delete_shard(&mut self, shard: &Shard) -> ShardingResult<()> {
        let idx = self
            .position(&shard.id)
            .ok_or_else(|| ShardingError::NotFound(shard.id.clone()))?;

        self.shards.remove(idx);
        Ok(())
    }

    fn shards(&self) -> Vec<Shard> {
        self.shards.clone()
    }

    fn kind(&self) -> AlgorithmType {
        AlgorithmType::Naive
    }

    fn len(&self) -> usize {
        self.shards.len()
    }
}
