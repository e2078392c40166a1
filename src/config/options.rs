//! The cache's configuration surface (§6), loaded from defaults,
//! overridden programmatically, or read from a JSON file following the
//! teacher's `EnterpriseConfig::from_file`/`::save` pattern.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::priority::PriorityWeights;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub max_memory_bytes: usize,
    pub max_indexed_db_bytes: usize,
    pub default_ttl_ms: i64,
    pub stale_ttl_ms: i64,
    pub enable_persistence: bool,
    pub priority_weights: PriorityWeights,
    pub min_hit_rate_for_adaptation: f64,
    pub compression_threshold: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            max_memory_bytes: 15 * 1024 * 1024,
            max_indexed_db_bytes: 25 * 1024 * 1024,
            default_ttl_ms: 5 * 60 * 1000,
            stale_ttl_ms: 10 * 60 * 1000,
            enable_persistence: true,
            priority_weights: PriorityWeights::default(),
            min_hit_rate_for_adaptation: 0.5,
            compression_threshold: 4096,
        }
    }
}

impl CacheOptions {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
