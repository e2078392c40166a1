//! Error kinds surfaced by the cache subsystem (§7), following the
//! teacher's per-module `thiserror` enum + `Result` alias convention
//! (compare `enterprise::mod::error::EnterpriseError`,
//! `database::DatabaseError`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Persistent storage not accessible; caller degrades to memory-only.
    #[error("persistent store unavailable: {0}")]
    Unavailable(String),

    /// Write to persistent store rejected for lack of space.
    #[error("persistent store quota exceeded")]
    QuotaExceeded,

    /// Non-serializable value given to `set`; rejected synchronously.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Eviction could not meet its target because too many entries are pinned.
    #[error("eviction pressure unmet: wanted {target} bytes, reached {reached} bytes")]
    PressureUnmet { target: usize, reached: usize },

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("storage engine error: {0}")]
    Storage(#[from] sled::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
