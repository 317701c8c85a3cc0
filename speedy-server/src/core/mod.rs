pub mod error;
pub mod types;

pub use error::{Result, SpeedyError};
pub use types::{CacheStats, EvictionPolicy, NodeInfo};
