//! Orchestrates [`crate::cache::memory::MemoryStore`] and
//! [`crate::cache::persistent::PersistentStore`]: promotion on read,
//! write-through on set, priority scoring, offline-mode policy, and quota
//! probing (§4.D CacheManager).

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::error::CacheResult;
use crate::cache::memory::{MemoryStats, MemoryStore};
use crate::cache::persistent::PersistentStore;
use crate::cache::priority::{compute_priority, PriorityWeights};
use crate::config::options::CacheOptions;
use crate::core::entry::{ContentType, Entry, EntryMetadata, PageType, Source};

const RECENT_ROUTES_CAPACITY: usize = 3;

/// What to invalidate: a single key, or every entry whose tags intersect the set.
pub enum InvalidateTarget {
    Key(String),
    Tags(Vec<String>),
}

#[derive(Debug, Clone, Copy)]
pub struct CacheStatsSnapshot {
    pub memory: MemoryStats,
    pub persistent_bytes: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaInfo {
    pub usage: usize,
    pub quota: usize,
    pub percentage: f64,
}

type MonitorHook = Box<dyn Fn(&CacheStatsSnapshot, Option<&QuotaInfo>) + Send + Sync>;

pub struct CacheManager<T> {
    memory: MemoryStore<T>,
    persistent: Option<PersistentStore<T>>,
    options: CacheOptions,
    weights: RwLock<PriorityWeights>,
    offline_mode: AtomicBool,
    adaptive_caching_enabled: AtomicBool,
    recent_routes: Mutex<VecDeque<String>>,
    monitor: Option<MonitorHook>,
}

impl<T: Clone + Serialize + DeserializeOwned> CacheManager<T> {
    pub fn new(options: CacheOptions, persistent_db_path: impl AsRef<Path>) -> Self {
        let persistent = if options.enable_persistence {
            Some(PersistentStore::open(persistent_db_path, options.compression_threshold))
        } else {
            None
        };
        CacheManager {
            memory: MemoryStore::new(options.max_memory_bytes, options.stale_ttl_ms),
            persistent,
            weights: RwLock::new(options.priority_weights),
            offline_mode: AtomicBool::new(false),
            adaptive_caching_enabled: AtomicBool::new(true),
            recent_routes: Mutex::new(VecDeque::with_capacity(RECENT_ROUTES_CAPACITY)),
            options,
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, hook: MonitorHook) -> Self {
        self.monitor = Some(hook);
        self
    }

    pub fn set_adaptive_caching_enabled(&self, enabled: bool) {
        self.adaptive_caching_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Memory hit, else persistent hit (promoted to memory), else miss.
    /// Priority is recomputed on every access hit.
    pub fn get(&self, key: &str) -> CacheResult<Option<Entry<T>>> {
        let now_ms = Utc::now().timestamp_millis();
        let allow_expired = self.offline_mode.load(Ordering::Relaxed);

        if let Some(mut hit) = self.memory.get(key, allow_expired, now_ms) {
            self.recompute_priority(&mut hit, now_ms);
            self.memory.set(key.to_string(), hit.clone());
            return Ok(Some(hit));
        }

        let Some(persistent) = &self.persistent else { return Ok(None) };
        let Some(mut hit) = persistent.get(key)? else { return Ok(None) };

        if hit.is_expired(now_ms) {
            if !allow_expired {
                return Ok(None);
            }
            hit.stale = true;
        }

        self.recompute_priority(&mut hit, now_ms);
        self.memory.set(key.to_string(), hit.clone());
        log::debug!("promoted {key} from persistent store to memory");
        Ok(Some(hit))
    }

    /// Memory-only variant for synchronous rendering paths.
    pub fn get_sync(&self, key: &str) -> Option<Entry<T>> {
        let now_ms = Utc::now().timestamp_millis();
        let allow_expired = self.offline_mode.load(Ordering::Relaxed);
        self.memory.get(key, allow_expired, now_ms)
    }

    pub fn set(
        &self,
        key: &str,
        data: T,
        route: &str,
        page_type: PageType,
        content_type: ContentType,
        ttl_ms: Option<i64>,
        size_bytes: usize,
    ) -> CacheResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        let ttl = ttl_ms.unwrap_or(self.options.default_ttl_ms);

        let mut metadata = EntryMetadata::new(route, page_type, content_type, now_ms);
        metadata.source = Source::Network;
        let priority = compute_priority(0, 0.0, page_type, content_type, &self.weights.read());

        let entry = Entry {
            data,
            timestamp: now_ms,
            expires_at: now_ms + ttl,
            priority,
            size_bytes,
            tags: Entry::<T>::derived_tags(route, page_type, content_type),
            stale: false,
            metadata,
        };

        self.push_recent_route(route);
        let protected = self.protected_routes(self.recent_routes.lock().iter().cloned().collect());
        self.memory.set_with_protected(key.to_string(), entry.clone(), &protected);
        if let Some(persistent) = &self.persistent {
            persistent.set(key, &entry)?;
        }

        self.publish_stats();
        Ok(())
    }

    pub fn invalidate(&self, target: InvalidateTarget) -> CacheResult<()> {
        match target {
            InvalidateTarget::Key(key) => {
                self.memory.delete(&key);
                if let Some(persistent) = &self.persistent {
                    persistent.delete(&key)?;
                }
            }
            InvalidateTarget::Tags(tags) => {
                self.memory.invalidate_by_tags(&tags);
                if let Some(persistent) = &self.persistent {
                    persistent.invalidate_by_tags(&tags)?;
                }
            }
        }
        Ok(())
    }

    pub fn cleanup(&self, memory_pressure: bool) -> CacheResult<()> {
        let now_ms = Utc::now().timestamp_millis();

        if memory_pressure {
            let target = self.options.max_memory_bytes / 2;
            let protected = self.recent_routes.lock().iter().cloned().collect();
            let protected = self.protected_routes(protected);
            self.memory.evict(target, &protected)?;
        } else if self.offline_mode.load(Ordering::Relaxed) {
            log::debug!("offline mode: skipping routine TTL cleanup");
        } else {
            self.memory.mark_stale_entries(now_ms);
            self.sweep_expired(now_ms);
            self.adapt_priority_weights();
        }

        if let Some(persistent) = &self.persistent {
            persistent.cleanup(self.options.max_indexed_db_bytes)?;
        }

        self.publish_stats();
        Ok(())
    }

    pub fn set_offline_mode(&self, offline: bool) {
        self.offline_mode.store(offline, Ordering::Relaxed);
    }

    pub fn is_offline(&self) -> bool {
        self.offline_mode.load(Ordering::Relaxed)
    }

    /// Analog of the platform storage-estimation facility: compares the
    /// persistent store's accounted size against `maxIndexedDBBytes`.
    pub fn check_storage_quota(&self) -> Option<QuotaInfo> {
        let persistent = self.persistent.as_ref()?;
        let usage = persistent.get_size();
        let quota = self.options.max_indexed_db_bytes;
        let percentage = if quota == 0 { 0.0 } else { 100.0 * usage as f64 / quota as f64 };
        if percentage > 80.0 {
            log::warn!("persistent store quota at {percentage:.1}%");
        }
        Some(QuotaInfo { usage, quota, percentage })
    }

    pub fn clear(&self) -> CacheResult<()> {
        self.memory.clear();
        if let Some(persistent) = &self.persistent {
            persistent.clear()?;
        }
        self.recent_routes.lock().clear();
        Ok(())
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            memory: self.memory.get_stats(),
            persistent_bytes: self.persistent.as_ref().map(|p| p.get_size()).unwrap_or(0),
        }
    }

    fn recompute_priority(&self, entry: &mut Entry<T>, now_ms: i64) {
        let age_hours = (now_ms - entry.metadata.last_accessed_at) as f64 / 3_600_000.0;
        let weights = *self.weights.read();
        entry.priority = compute_priority(
            entry.metadata.access_count,
            age_hours.max(0.0),
            entry.metadata.page_type,
            entry.metadata.content_type,
            &weights,
        );
    }

    fn sweep_expired(&self, now_ms: i64) {
        for key in self.memory.keys() {
            if let Some(e) = self.memory.peek(&key) {
                if e.is_expired(now_ms) && !e.is_pinned() {
                    self.memory.delete(&key);
                }
            }
        }
    }

    fn adapt_priority_weights(&self) {
        if !self.adaptive_caching_enabled.load(Ordering::Relaxed) {
            return;
        }
        let stats = self.memory.get_stats();
        if stats.entries > 10 && stats.hit_rate() < self.options.min_hit_rate_for_adaptation {
            let mut weights = self.weights.write();
            weights.shift_toward_frequency();
            log::info!("adaptive reweighting: frequency weight now {:.2}", weights.frequency);
        }
    }

    fn push_recent_route(&self, route: &str) {
        let mut routes = self.recent_routes.lock();
        routes.retain(|r| r != route);
        routes.push_back(route.to_string());
        while routes.len() > RECENT_ROUTES_CAPACITY {
            routes.pop_front();
        }
    }

    /// Resolves the recent-routes protection set for pressure eviction.
    /// When the window is full (3 routes), the oldest loses protection so
    /// that a sustained stream of new routes can still reclaim space; below
    /// that, every route seen so far is protected.
    fn protected_routes(&self, routes: Vec<String>) -> std::collections::HashSet<String> {
        if routes.len() >= RECENT_ROUTES_CAPACITY {
            routes.into_iter().skip(1).collect()
        } else {
            routes.into_iter().collect()
        }
    }

    fn publish_stats(&self) {
        if let Some(monitor) = &self.monitor {
            let stats = self.stats();
            let quota = self.check_storage_quota();
            monitor(&stats, quota.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(max_memory: usize) -> CacheOptions {
        CacheOptions {
            max_memory_bytes: max_memory,
            ..CacheOptions::default()
        }
    }

    fn tmp_path() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("navcache-manager-test-{}-{:?}", std::process::id(), std::thread::current().id()));
        p
    }

    #[test]
    fn set_then_get_round_trips_and_tags_are_derived() {
        let manager: CacheManager<String> = CacheManager::new(options(1_000_000), tmp_path());
        manager
            .set("k", "v".to_string(), "/dashboard", PageType::Dashboard, ContentType::UserGenerated, None, 10)
            .unwrap();
        let entry = manager.get("k").unwrap().unwrap();
        assert_eq!(entry.data, "v");
        assert!(entry.tags.contains("route:/dashboard"));
        assert!(entry.tags.contains("page:dashboard"));
        assert!(entry.tags.contains("content:user-generated"));
        let _ = manager.clear();
    }

    #[test]
    fn invalidate_by_key_removes_from_both_layers() {
        let manager: CacheManager<String> = CacheManager::new(options(1_000_000), tmp_path());
        manager
            .set("k", "v".to_string(), "/a", PageType::Other, ContentType::Generic, None, 10)
            .unwrap();
        manager.invalidate(InvalidateTarget::Key("k".to_string())).unwrap();
        assert!(manager.get("k").unwrap().is_none());
        let _ = manager.clear();
    }

    #[test]
    fn offline_mode_returns_expired_entries_as_stale() {
        let manager: CacheManager<String> = CacheManager::new(options(1_000_000), tmp_path());
        manager
            .set("k", "v".to_string(), "/a", PageType::Other, ContentType::Generic, Some(1), 10)
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(manager.get("k").unwrap().is_none());
        manager.set_offline_mode(true);
        let entry = manager.get("k").unwrap().unwrap();
        assert!(entry.stale);
        let _ = manager.clear();
    }
}
