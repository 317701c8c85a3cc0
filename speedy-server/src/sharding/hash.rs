//! Key hashing shared by the sharding strategies - CRC32 (IEEE)

use std::sync::Arc;

/// Hash function mapping a key to a 32-bit position
pub type HashFn = Arc<dyn Fn(&str) -> u32 + Send + Sync>;

/// Calculate the CRC32 (IEEE polynomial) checksum of a key
///
/// # Example
/// ```
/// use speedy_server::sharding::hash::crc32_hash;
///
/// assert_eq!(crc32_hash("user:1001"), crc32_hash("user:1001"));
/// assert_ne!(crc32_hash("user:1001"), crc32_hash("user:1002"));
/// ```
pub fn crc32_hash(key: &str) -> u32 {
    crc32fast::hash(key.as_bytes())
}

/// Default hash function used by clients and tests
pub fn default_hash() -> HashFn {
    Arc::new(crc32_hash)
}
