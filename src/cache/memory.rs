//! Bounded in-process cache with LRU-plus-priority eviction, TTL, stale
//! marking, and a tag index (§4.B MemoryStore).
//!
//! Grounded on `enterprise::cache::tier::{LruCache, MultiTierCache}` for the
//! concurrent-map shape (`dashmap::DashMap`) and on
//! `enterprise::cache::invalidation::TagInvalidator` for the tag-index
//! bookkeeping.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::cache::error::CacheError;
use crate::core::entry::Entry;

#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryStats {
    pub entries: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl MemoryStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded in-process map with LRU + priority eviction, TTL, stale marking,
/// and a tag index. `T` is the cached payload type.
pub struct MemoryStore<T> {
    entries: DashMap<String, Entry<T>>,
    tag_index: DashMap<String, BTreeSet<String>>,
    max_memory_bytes: usize,
    stale_ttl_ms: i64,
    total_bytes: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    // Guards `evict` so concurrent overflowing `set`s don't race the size
    // accounting invariant (§3 invariant 2).
    eviction_lock: Mutex<()>,
}

impl<T: Clone> MemoryStore<T> {
    pub fn new(max_memory_bytes: usize, stale_ttl_ms: i64) -> Self {
        MemoryStore {
            entries: DashMap::new(),
            tag_index: DashMap::new(),
            max_memory_bytes,
            stale_ttl_ms,
            total_bytes: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            eviction_lock: Mutex::new(()),
        }
    }

    /// Updates `lastAccessedAt`/`accessCount`. Returns `None` for an expired
    /// entry unless `allow_expired`, in which case it is returned without
    /// deletion so offline promotion from the persistent store can still
    /// see the key.
    pub fn get(&self, key: &str, allow_expired: bool, now_ms: i64) -> Option<Entry<T>> {
        let mut entry_ref = self.entries.get_mut(key)?;
        if entry_ref.is_expired(now_ms) && !allow_expired {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        entry_ref.metadata.last_accessed_at = now_ms;
        entry_ref.metadata.access_count += 1;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry_ref.clone())
    }

    /// Reads an entry without touching `lastAccessedAt`, `accessCount`, or
    /// the hit/miss counters. For internal bookkeeping passes (e.g.
    /// sweeping expired entries) that must not perturb the hit-rate signal
    /// adaptive reweighting reads afterward.
    pub fn peek(&self, key: &str) -> Option<Entry<T>> {
        self.entries.get(key).map(|entry_ref| entry_ref.clone())
    }

    /// Inserts or overwrites, updates the tag index, and evicts if the
    /// resulting size exceeds `max_memory_bytes`.
    pub fn set(&self, key: String, entry: Entry<T>) {
        self.set_with_protected(key, entry, &HashSet::new());
    }

    /// Same as [`MemoryStore::set`], but the post-insert eviction (if
    /// triggered) exempts `protected_routes`. Used by `CacheManager` so the
    /// route just written, and its recent neighbors, aren't immediately
    /// evicted by their own insert (§4.D recent-route pinning).
    pub fn set_with_protected(&self, key: String, entry: Entry<T>, protected_routes: &HashSet<String>) {
        if let Some(old) = self.entries.get(&key) {
            self.total_bytes.fetch_sub(old.size_bytes, Ordering::Relaxed);
            self.remove_from_tag_index(&key, &old.tags);
        }
        self.total_bytes.fetch_add(entry.size_bytes, Ordering::Relaxed);
        self.add_to_tag_index(&key, &entry.tags);
        self.entries.insert(key, entry);

        if self.total_bytes.load(Ordering::Relaxed) > self.max_memory_bytes {
            let _ = self.evict(self.max_memory_bytes, protected_routes);
        }
    }

    pub fn delete(&self, key: &str) {
        if let Some((_, old)) = self.entries.remove(key) {
            self.total_bytes.fetch_sub(old.size_bytes, Ordering::Relaxed);
            self.remove_from_tag_index(key, &old.tags);
        }
    }

    pub fn invalidate_by_tags(&self, tags: &[String]) {
        let mut keys = HashSet::new();
        for tag in tags {
            if let Some(set) = self.tag_index.get(tag) {
                keys.extend(set.iter().cloned());
            }
        }
        for key in keys {
            self.delete(&key);
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.tag_index.clear();
        self.total_bytes.store(0, Ordering::Relaxed);
    }

    /// Flags entries older than `stale_ttl_ms` as stale and returns their keys.
    pub fn mark_stale_entries(&self, now_ms: i64) -> Vec<String> {
        let mut marked = Vec::new();
        for mut item in self.entries.iter_mut() {
            if !item.stale && now_ms - item.timestamp > self.stale_ttl_ms {
                item.stale = true;
                marked.push(item.key().clone());
            }
        }
        marked
    }

    pub fn get_stats(&self) -> MemoryStats {
        MemoryStats {
            entries: self.entries.len(),
            bytes: self.total_bytes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// `evict(target)` per §4.B: drop unpinned entries lowest-priority-first
    /// (ties broken by least-recently-accessed) until the byte total is at
    /// or below `target`. `protected_routes` additionally exempts entries
    /// whose `route:<r>` tag matches, used by `CacheManager`'s pressure
    /// cleanup (§4.D recent-route pinning); pass an empty set for the plain
    /// §4.B algorithm invoked internally by `set`.
    pub fn evict(&self, target: usize, protected_routes: &HashSet<String>) -> Result<(), CacheError> {
        let _guard = self.eviction_lock.lock();

        if self.total_bytes.load(Ordering::Relaxed) <= target {
            return Ok(());
        }

        let mut candidates: Vec<(String, f64, i64, usize)> = self
            .entries
            .iter()
            .filter(|item| !item.is_pinned())
            .filter(|item| !protected_routes.contains(&item.metadata.route))
            .map(|item| {
                (
                    item.key().clone(),
                    item.priority,
                    item.metadata.last_accessed_at,
                    item.size_bytes,
                )
            })
            .collect();

        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.2.cmp(&b.2)));

        for (key, _, _, _) in candidates {
            if self.total_bytes.load(Ordering::Relaxed) <= target {
                break;
            }
            self.delete(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        let reached = self.total_bytes.load(Ordering::Relaxed);
        if reached > target {
            log::warn!("eviction pressure unmet: target={target} reached={reached}");
            return Err(CacheError::PressureUnmet { target, reached });
        }
        Ok(())
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|item| item.key().clone()).collect()
    }

    fn add_to_tag_index(&self, key: &str, tags: &BTreeSet<String>) {
        for tag in tags {
            self.tag_index.entry(tag.clone()).or_default().insert(key.to_string());
        }
    }

    fn remove_from_tag_index(&self, key: &str, tags: &BTreeSet<String>) {
        for tag in tags {
            if let Some(mut set) = self.tag_index.get_mut(tag) {
                set.remove(key);
                if set.is_empty() {
                    drop(set);
                    self.tag_index.remove(tag);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::{ContentType, EntryMetadata, PageType};

    fn entry(route: &str, priority: f64, size: usize, now: i64) -> Entry<String> {
        Entry {
            data: "x".to_string(),
            timestamp: now,
            expires_at: now + 100_000,
            priority,
            size_bytes: size,
            tags: Entry::<String>::derived_tags(route, PageType::Other, ContentType::Generic),
            stale: false,
            metadata: EntryMetadata::new(route, PageType::Other, ContentType::Generic, now),
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let store: MemoryStore<String> = MemoryStore::new(10_000, 60_000);
        store.set("k".into(), entry("/a", 50.0, 10, 0));
        let got = store.get("k", false, 1).unwrap();
        assert_eq!(got.data, "x");
        assert_eq!(got.metadata.access_count, 1);
    }

    #[test]
    fn expired_without_allow_returns_none_but_does_not_delete() {
        let store: MemoryStore<String> = MemoryStore::new(10_000, 60_000);
        let mut e = entry("/a", 50.0, 10, 0);
        e.expires_at = 5;
        store.set("k".into(), e);
        assert!(store.get("k", false, 10).is_none());
        assert!(store.contains_key("k"));
        assert!(store.get("k", true, 10).is_some());
    }

    #[test]
    fn pinned_entries_survive_eviction() {
        let store: MemoryStore<String> = MemoryStore::new(100, 60_000);
        store.set("pinned".into(), entry("/a", 90.0, 80, 0));
        store.set("low".into(), entry("/b", 10.0, 80, 0));
        assert!(store.contains_key("pinned"));
        assert!(!store.contains_key("low"));
    }

    #[test]
    fn invalidate_by_tags_removes_matching_entries() {
        let store: MemoryStore<String> = MemoryStore::new(10_000, 60_000);
        store.set("a".into(), entry("/a", 50.0, 10, 0));
        store.set("b".into(), entry("/b", 50.0, 10, 0));
        store.invalidate_by_tags(&["route:/a".to_string()]);
        assert!(!store.contains_key("a"));
        assert!(store.contains_key("b"));
    }

    #[test]
    fn mark_stale_entries_flags_old_entries() {
        let store: MemoryStore<String> = MemoryStore::new(10_000, 100);
        store.set("k".into(), entry("/a", 50.0, 10, 0));
        let marked = store.mark_stale_entries(1000);
        assert_eq!(marked, vec!["k".to_string()]);
        assert!(store.get("k", true, 1000).unwrap().stale);
    }

    #[test]
    fn pressure_unmet_when_all_pinned() {
        let store: MemoryStore<String> = MemoryStore::new(1000, 60_000);
        store.set("a".into(), entry("/a", 90.0, 800, 0));
        let result = store.evict(100, &HashSet::new());
        assert!(matches!(result, Err(CacheError::PressureUnmet { .. })));
        assert!(store.contains_key("a"));
    }
}
