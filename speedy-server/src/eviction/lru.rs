use super::EvictionAlgorithm;
use crate::core::CacheStats;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Fixed-capacity LRU cache.
///
/// Entries live in an arena (`slots`) and are linked by index from the most
/// recently used (`head`) to the least recently used (`tail`). Freed slots
/// are recycled through `free`, so promote and evict stay O(1) without
/// any pointer bookkeeping.
///
/// `get` mutates the recency list, so every operation takes the same
/// exclusive lock around the whole lookup/promote/evict sequence.
pub struct LruCache {
    inner: Mutex<LruInner>,
}

struct LruInner {
    capacity: usize,
    index: HashMap<String, usize>,
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    stats: CacheStats,
}

struct Slot {
    key: String,
    value: String,
    prev: Option<usize>,
    next: Option<usize>,
}

impl LruCache {
    /// Create a new LRU cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner {
                capacity,
                index: HashMap::with_capacity(capacity),
                slots: Vec::with_capacity(capacity),
                free: Vec::new(),
                head: None,
                tail: None,
                stats: CacheStats {
                    capacity: capacity as u32,
                    ..Default::default()
                },
            }),
        }
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut keys = Vec::with_capacity(inner.index.len());
        let mut cursor = inner.head;
        while let Some(idx) = cursor {
            keys.push(inner.slots[idx].key.clone());
            cursor = inner.slots[idx].next;
        }
        keys
    }
}

impl LruInner {
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);

        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }

        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    fn push_front(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.head;

        if let Some(h) = self.head {
            self.slots[h].prev = Some(idx);
        }
        self.head = Some(idx);

        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn allocate(&mut self, key: String, value: String) -> usize {
        let slot = Slot {
            key,
            value,
            prev: None,
            next: None,
        };

        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        }
    }

    fn evict_tail(&mut self) {
        let Some(idx) = self.tail else {
            return;
        };

        self.unlink(idx);
        let key = std::mem::take(&mut self.slots[idx].key);
        self.slots[idx].value.clear();
        self.index.remove(&key);
        self.free.push(idx);

        self.stats.evictions += 1;
        debug!("LRU EVICT: {}", key);
    }
}

impl EvictionAlgorithm for LruCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock();

        match inner.index.get(key).copied() {
            Some(idx) => {
                inner.promote(idx);
                inner.stats.hits += 1;
                Some(inner.slots[idx].value.clone())
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    fn put(&self, key: String, value: String) {
        let mut inner = self.inner.lock();

        if let Some(idx) = inner.index.get(&key).copied() {
            inner.slots[idx].value = value;
            inner.promote(idx);
            return;
        }

        let idx = inner.allocate(key.clone(), value);
        inner.index.insert(key, idx);
        inner.push_front(idx);

        if inner.index.len() > inner.capacity {
            inner.evict_tail();
        }
    }

    fn len(&self) -> u32 {
        self.inner.lock().index.len() as u32
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.index.len() as u32,
            ..inner.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn put(cache: &LruCache, key: &str, value: &str) {
        cache.put(key.to_string(), value.to_string());
    }

    #[test]
    fn test_cache_put_get() {
        let cache = LruCache::new(100);

        put(&cache, "key1", "value1");

        assert_eq!(cache.get("key1"), Some("value1".to_string()));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_cache_miss() {
        let cache = LruCache::new(100);

        assert!(cache.get("nonexistent").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_cache_lru_eviction() {
        let cache = LruCache::new(3);

        put(&cache, "a", "1");
        put(&cache, "b", "2");
        put(&cache, "c", "3");
        put(&cache, "d", "4");

        assert!(cache.get("a").is_none(), "a should be evicted");
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_promotes_entry() {
        let cache = LruCache::new(3);

        put(&cache, "a", "1");
        put(&cache, "b", "2");
        put(&cache, "c", "3");

        // Access a (moves to head)
        cache.get("a");

        put(&cache, "d", "4");

        assert!(cache.get("a").is_some(), "a was accessed, should survive");
        assert!(cache.get("b").is_none(), "b should be evicted (oldest)");
    }

    #[test]
    fn test_put_existing_updates_and_promotes() {
        let cache = LruCache::new(2);

        put(&cache, "a", "1");
        put(&cache, "b", "2");
        put(&cache, "a", "10");
        put(&cache, "c", "3");

        assert_eq!(cache.get("a"), Some("10".to_string()));
        assert!(cache.get("b").is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_recency_order() {
        let cache = LruCache::new(4);

        put(&cache, "a", "1");
        put(&cache, "b", "2");
        put(&cache, "c", "3");
        cache.get("a");

        assert_eq!(cache.keys(), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let cache = LruCache::new(10);

        for i in 0..100 {
            put(&cache, &format!("key{}", i), "v");
            assert!(cache.len() <= 10);
        }

        // The ten most recent keys survive
        for i in 90..100 {
            assert!(cache.get(&format!("key{}", i)).is_some());
        }
        assert_eq!(cache.stats().evictions, 90);
    }

    #[test]
    fn test_slots_are_recycled() {
        let cache = LruCache::new(2);

        for i in 0..50 {
            put(&cache, &format!("key{}", i), "v");
        }

        let inner = cache.inner.lock();
        assert!(inner.slots.len() <= 3);
        assert_eq!(inner.index.len(), 2);
    }

    #[test]
    fn test_single_capacity() {
        let cache = LruCache::new(1);

        put(&cache, "a", "1");
        put(&cache, "b", "2");

        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some("2".to_string()));
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(LruCache::new(64));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let key = format!("t{}-{}", t, i % 40);
                        cache.put(key.clone(), i.to_string());
                        cache.get(&key);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 64);
        assert_eq!(cache.keys().len(), cache.len() as usize);
    }
}
