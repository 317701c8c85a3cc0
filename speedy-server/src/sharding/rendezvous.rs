use super::{AlgorithmType, HashFn, Shard, ShardingAlgorithm, ShardingError, ShardingResult};

/// Highest-random-weight sharding.
///
/// Each shard scores `hash(key + shard_id)`; the highest score owns the key,
/// ties going to the earlier-registered shard. Removing a shard only moves
/// the keys it owned.
pub struct Rendezvous {
    shards: Vec<Shard>,
    hash: HashFn,
}

impl Rendezvous {
    pub fn new(hash: HashFn) -> Self {
        Self {
            shards: Vec::new(),
            hash,
        }
    }

    fn score(&self, key: &str, shard: &Shard) -> u32 {
        let mut combined = String::with_capacity(key.len() + shard.id.len());
        combined.push_str(key);
        combined.push_str(&shard.id);
        (self.hash)(&combined)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.shards.iter().position(|s| s.id == id)
    }
}

impl ShardingAlgorithm for Rendezvous {
    fn get_shard(&self, key: &str) -> Option<Shard> {
        let mut best: Option<(u32, &Shard)> = None;

        for shard in &self.shards {
            let score = self.score(key, shard);
            match best {
                Some((top, _)) if score <= top => {}
                _ => best = Some((score, shard)),
            }
        }

        best.map(|(_, shard)| shard.clone())
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
        AlgorithmType::Rendezvous
    }

    fn len(&self) -> usize {
        self.shards.len()
    }
}
