//! The background execution context: owns its own persistent store,
//! handles the typed message protocol, and decides navigation responses
//! (§4.H WorkerCache & Bridge).
//!
//! Grounded on `enterprise::cache::invalidation::TagInvalidator`'s
//! `tokio::sync::broadcast` fan-out for "broadcast cache-updated
//! notifications to all attached UI contexts."

use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::cache::error::CacheResult;
use crate::cache::persistent::PersistentStore;
use crate::core::entry::{Entry, Source};
use crate::worker::lifecycle::Prefetcher;
use crate::worker::messages::{KeyOrTags, WorkerMessage};

/// Independent of `CacheManager`'s `staleTTL` per the spec's open question
/// on the two duplicated stale thresholds: the worker's navigation
/// staleness check uses its own 5-minute tunable.
pub const NAVIGATION_STALE_THRESHOLD_MS: i64 = 5 * 60 * 1000;

const BROADCAST_CAPACITY: usize = 256;

pub struct WorkerCache {
    store: PersistentStore<Value>,
    broadcast: broadcast::Sender<WorkerMessage>,
    prefetcher: Option<Prefetcher>,
}

impl WorkerCache {
    pub fn new(persistent_db_path: impl AsRef<Path>, compression_threshold: usize) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        WorkerCache {
            store: PersistentStore::open(persistent_db_path, compression_threshold),
            broadcast: tx,
            prefetcher: None,
        }
    }

    /// Wires in the network prefetcher `CACHE_WARM` drives, the same
    /// injection seam `worker::lifecycle::install` uses for its own
    /// out-of-scope network operation.
    pub fn with_prefetcher(mut self, prefetcher: Prefetcher) -> Self {
        self.prefetcher = Some(prefetcher);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
        self.broadcast.subscribe()
    }

    fn broadcast(&self, message: WorkerMessage) {
        // No attached contexts is a normal state (e.g. in tests); a send
        // error here just means there are currently no subscribers.
        let _ = self.broadcast.send(message);
    }

    /// Handles one inbound message, returning a direct reply where the
    /// protocol calls for one (`CACHE_GET` → `CACHE_GET_RESPONSE`).
    /// Broadcast-only effects (warm completion, invalidation side effects)
    /// are sent via [`WorkerCache::subscribe`] instead of the return value.
    pub async fn handle_message(&self, message: WorkerMessage) -> CacheResult<Option<WorkerMessage>> {
        match message {
            WorkerMessage::CacheSet { key, cache_entry } => {
                self.store.set(&key, &cache_entry)?;
                Ok(None)
            }
            WorkerMessage::CacheGet { key, request_id } => {
                let cache_entry = self.store.get(&key)?;
                Ok(Some(WorkerMessage::CacheGetResponse {
                    key,
                    cache_entry,
                    request_id,
                    timestamp: Utc::now().timestamp_millis(),
                }))
            }
            WorkerMessage::CacheInvalidate { key_or_tags } => {
                match key_or_tags {
                    KeyOrTags::Key(key) => self.store.delete(&key)?,
                    KeyOrTags::Tags(tags) => self.store.invalidate_by_tags(&tags)?,
                }
                Ok(None)
            }
            WorkerMessage::CacheWarm { routes } => {
                let routes = routes.unwrap_or_default();
                let (success_count, failure_count) = self.run_warm(&routes).await;
                let complete = WorkerMessage::CacheWarmComplete {
                    routes,
                    success_count: Some(success_count),
                    failure_count: Some(failure_count),
                    timestamp: Utc::now().timestamp_millis(),
                };
                self.broadcast(complete);
                Ok(None)
            }
            other @ (WorkerMessage::CacheGetResponse { .. }
            | WorkerMessage::CacheWarmComplete { .. }
            | WorkerMessage::CacheWarmFailed { .. }
            | WorkerMessage::CacheUpdated { .. }) => {
                log::warn!("worker received an outbound-only message type: {other:?}");
                Ok(None)
            }
        }
    }

    /// Drives `routes` through the configured prefetcher sequentially,
    /// mirroring `lifecycle::install`'s per-item await loop. With no
    /// prefetcher configured, nothing is attempted and both counts are
    /// zero, which also covers the empty-route-list case.
    async fn run_warm(&self, routes: &[String]) -> (usize, usize) {
        let Some(prefetcher) = &self.prefetcher else {
            if !routes.is_empty() {
                log::warn!("CACHE_WARM requested {} routes but no prefetcher is configured", routes.len());
            }
            return (0, 0);
        };

        let mut success_count = 0;
        let mut failure_count = 0;
        for route in routes {
            match prefetcher(route).await {
                Ok(()) => success_count += 1,
                Err(err) => {
                    log::warn!("cache warm failed for {route}: {err}");
                    failure_count += 1;
                }
            }
        }
        (success_count, failure_count)
    }

    /// Emits `CACHE_UPDATED` after a background refresh writes a fresh
    /// record, per §4.H.
    pub fn notify_updated(&self, key: &str, source: Source) {
        self.broadcast(WorkerMessage::CacheUpdated {
            key: key.to_string(),
            source,
            timestamp: Utc::now().timestamp_millis(),
        });
    }

    pub fn get_page_state(&self, pathname: &str) -> CacheResult<Option<Entry<Value>>> {
        self.store.get(&format!("page:{pathname}"))
    }

    pub fn is_record_stale(entry: &Entry<Value>, now_ms: i64) -> bool {
        entry.stale || now_ms - entry.timestamp > NAVIGATION_STALE_THRESHOLD_MS
    }
}

/// Pure decision for steps 1-3 of the navigation strategy (§4.H); step 4's
/// network race is driven by the caller since it needs real async I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Offline with a cached response available.
    ServeCached,
    /// Offline with no cached response; serve the offline fallback page.
    ServeOfflinePage,
    /// Offline with neither a cached response nor an offline page.
    ServeEmergencyShell,
    /// Online, cached and stale: serve immediately and revalidate in the background.
    ServeCachedAndRevalidate,
    /// Online with nothing usable cached: race the network fetch.
    RaceNetwork,
}

pub fn decide_navigation(is_offline: bool, cached: Option<&Entry<Value>>, now_ms: i64) -> NavigationDecision {
    if is_offline {
        return match cached {
            Some(_) => NavigationDecision::ServeCached,
            None => NavigationDecision::ServeOfflinePage,
        };
    }

    match cached {
        Some(entry) if WorkerCache::is_record_stale(entry, now_ms) => NavigationDecision::ServeCachedAndRevalidate,
        _ => NavigationDecision::RaceNetwork,
    }
}
