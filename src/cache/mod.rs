//! The two-tier cache: in-process memory store, durable persistent store,
//! and the manager orchestrating both (§4.B–D).

pub mod error;
pub mod manager;
pub mod memory;
pub mod persistent;
pub mod priority;

pub use error::{CacheError, CacheResult};
pub use manager::{CacheManager, CacheStatsSnapshot, InvalidateTarget, QuotaInfo};
pub use memory::{MemoryStats, MemoryStore};
pub use persistent::PersistentStore;
pub use priority::PriorityWeights;
