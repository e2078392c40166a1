//! Durable key→entry store over `sled`, with O(entries) size accounting and
//! secondary indexes by timestamp, expiry, priority, and tags (§4.C
//! PersistentStore).
//!
//! Grounded on `database::cache::CacheManager`'s L2 tier (sled open,
//! bincode serialize, optional lz4 compression above a size threshold) and
//! on `enterprise::cache::invalidation::TagInvalidator` for the tag-index
//! shape, adapted here to sled's ordered byte-keyed trees instead of an
//! in-memory `DashMap`.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::error::{CacheError, CacheResult};
use crate::core::entry::Entry;

const COMPRESSED_FLAG: u8 = 1;
const RAW_FLAG: u8 = 0;

fn sortable_i64(v: i64) -> [u8; 8] {
    ((v as u64) ^ (1u64 << 63)).to_be_bytes()
}

fn sortable_f64(v: f64) -> [u8; 8] {
    let bits = v.to_bits();
    let t = if bits >> 63 == 1 { !bits } else { bits | (1u64 << 63) };
    t.to_be_bytes()
}

fn index_key(prefix: [u8; 8], original_key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + original_key.len());
    buf.extend_from_slice(&prefix);
    buf.extend_from_slice(original_key.as_bytes());
    buf
}

fn tag_index_key(tag: &str, original_key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(tag.len() + 1 + original_key.len());
    buf.extend_from_slice(tag.as_bytes());
    buf.push(0);
    buf.extend_from_slice(original_key.as_bytes());
    buf
}

struct Trees {
    main: sled::Tree,
    sizes: sled::Tree,
    by_timestamp: sled::Tree,
    by_expires_at: sled::Tree,
    by_priority: sled::Tree,
    by_tag: sled::Tree,
}

/// Durable cache store. Degrades gracefully: if the backing `sled` database
/// could not be opened, every operation becomes a logged no-op (§4.C
/// failure model) and [`PersistentStore::is_enabled`] returns `false`.
pub struct PersistentStore<T> {
    trees: Option<Trees>,
    compression_threshold: usize,
    total_bytes: AtomicUsize,
    disabled_logged: AtomicBool,
    _marker: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> PersistentStore<T> {
    pub fn open(path: impl AsRef<Path>, compression_threshold: usize) -> Self {
        match sled::open(path.as_ref()) {
            Ok(db) => match Self::open_trees(&db) {
                Ok(trees) => {
                    let total_bytes = trees
                        .sizes
                        .iter()
                        .values()
                        .filter_map(|v| v.ok())
                        .map(|v| usize::from_be_bytes(v.as_ref().try_into().unwrap_or([0; 8])))
                        .sum();
                    PersistentStore {
                        trees: Some(trees),
                        compression_threshold,
                        total_bytes: AtomicUsize::new(total_bytes),
                        disabled_logged: AtomicBool::new(false),
                        _marker: PhantomData,
                    }
                }
                Err(err) => Self::disabled(&err.to_string(), compression_threshold),
            },
            Err(err) => Self::disabled(&err.to_string(), compression_threshold),
        }
    }

    fn open_trees(db: &sled::Db) -> sled::Result<Trees> {
        Ok(Trees {
            main: db.open_tree("page-cache")?,
            sizes: db.open_tree("page-cache-sizes")?,
            by_timestamp: db.open_tree("page-cache-by-timestamp")?,
            by_expires_at: db.open_tree("page-cache-by-expires-at")?,
            by_priority: db.open_tree("page-cache-by-priority")?,
            by_tag: db.open_tree("page-cache-by-tag")?,
        })
    }

    fn disabled(reason: &str, compression_threshold: usize) -> Self {
        log::error!("persistent store unavailable, degrading to memory-only: {reason}");
        PersistentStore {
            trees: None,
            compression_threshold,
            total_bytes: AtomicUsize::new(0),
            disabled_logged: AtomicBool::new(true),
            _marker: PhantomData,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.trees.is_some()
    }

    pub fn get(&self, key: &str) -> CacheResult<Option<Entry<T>>> {
        let Some(trees) = &self.trees else { return Ok(None) };
        let Some(raw) = trees.main.get(key)? else { return Ok(None) };
        Ok(Some(Self::decode(&raw)?))
    }

    pub fn set(&self, key: &str, entry: &Entry<T>) -> CacheResult<()> {
        let Some(trees) = &self.trees else { return Ok(()) };

        let encoded = Self::encode(entry, self.compression_threshold)?;
        let new_size = entry.size_bytes;

        if let Some(old_raw) = trees.main.get(key)? {
            let old = Self::decode(&old_raw)?;
            self.total_bytes.fetch_sub(old.size_bytes, Ordering::Relaxed);
            self.remove_indexes(trees, key, &old)?;
        }

        trees.main.insert(key, encoded)?;
        trees.sizes.insert(key, &new_size.to_be_bytes())?;
        self.total_bytes.fetch_add(new_size, Ordering::Relaxed);
        self.add_indexes(trees, key, entry)?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> CacheResult<()> {
        let Some(trees) = &self.trees else { return Ok(()) };
        if let Some(old_raw) = trees.main.remove(key)? {
            let old = Self::decode(&old_raw)?;
            self.total_bytes.fetch_sub(old.size_bytes, Ordering::Relaxed);
            trees.sizes.remove(key)?;
            self.remove_indexes(trees, key, &old)?;
        }
        Ok(())
    }

    pub fn invalidate_by_tags(&self, tags: &[String]) -> CacheResult<()> {
        let Some(trees) = &self.trees else { return Ok(()) };
        let mut keys = HashSet::new();
        for tag in tags {
            let prefix = {
                let mut p = tag.as_bytes().to_vec();
                p.push(0);
                p
            };
            for item in trees.by_tag.scan_prefix(&prefix) {
                let (k, _) = item?;
                if let Some(original) = k.get(prefix.len()..) {
                    keys.insert(String::from_utf8_lossy(original).into_owned());
                }
            }
        }
        for key in keys {
            self.delete(&key)?;
        }
        Ok(())
    }

    pub fn clear(&self) -> CacheResult<()> {
        let Some(trees) = &self.trees else { return Ok(()) };
        trees.main.clear()?;
        trees.sizes.clear()?;
        trees.by_timestamp.clear()?;
        trees.by_expires_at.clear()?;
        trees.by_priority.clear()?;
        trees.by_tag.clear()?;
        self.total_bytes.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// O(entries): sums the `sizes` side tree without deserializing payloads.
    pub fn get_size(&self) -> usize {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn get_all_keys(&self) -> CacheResult<Vec<String>> {
        let Some(trees) = &self.trees else { return Ok(Vec::new()) };
        let mut keys = Vec::new();
        for item in trees.main.iter() {
            let (k, _) = item?;
            keys.push(String::from_utf8_lossy(&k).into_owned());
        }
        Ok(keys)
    }

    /// Evicts lowest-priority/least-recent unpinned entries until total size
    /// is at or below `max_bytes`, same ordering as §4.B.
    pub fn cleanup(&self, max_bytes: usize) -> CacheResult<()> {
        let Some(trees) = &self.trees else { return Ok(()) };
        if self.total_bytes.load(Ordering::Relaxed) <= max_bytes {
            return Ok(());
        }

        let mut candidates: Vec<(String, f64, i64)> = Vec::new();
        for item in trees.main.iter() {
            let (k, v) = item?;
            let key = String::from_utf8_lossy(&k).into_owned();
            let entry = Self::decode(&v)?;
            if entry.is_pinned() {
                continue;
            }
            candidates.push((key, entry.priority, entry.metadata.last_accessed_at));
        }
        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then(a.2.cmp(&b.2)));

        for (key, _, _) in candidates {
            if self.total_bytes.load(Ordering::Relaxed) <= max_bytes {
                break;
            }
            self.delete(&key)?;
        }

        let reached = self.total_bytes.load(Ordering::Relaxed);
        if reached > max_bytes {
            log::warn!("persistent cleanup pressure unmet: target={max_bytes} reached={reached}");
            return Err(CacheError::PressureUnmet { target: max_bytes, reached });
        }
        Ok(())
    }

    fn add_indexes(&self, trees: &Trees, key: &str, entry: &Entry<T>) -> CacheResult<()> {
        trees
            .by_timestamp
            .insert(index_key(sortable_i64(entry.timestamp), key), &[])?;
        trees
            .by_expires_at
            .insert(index_key(sortable_i64(entry.expires_at), key), &[])?;
        trees
            .by_priority
            .insert(index_key(sortable_f64(entry.priority), key), &[])?;
        for tag in &entry.tags {
            trees.by_tag.insert(tag_index_key(tag, key), &[])?;
        }
        Ok(())
    }

    fn remove_indexes(&self, trees: &Trees, key: &str, entry: &Entry<T>) -> CacheResult<()> {
        trees.by_timestamp.remove(index_key(sortable_i64(entry.timestamp), key))?;
        trees
            .by_expires_at
            .remove(index_key(sortable_i64(entry.expires_at), key))?;
        trees.by_priority.remove(index_key(sortable_f64(entry.priority), key))?;
        for tag in &entry.tags {
            trees.by_tag.remove(tag_index_key(tag, key))?;
        }
        Ok(())
    }

    fn encode(entry: &Entry<T>, threshold: usize) -> CacheResult<Vec<u8>> {
        let raw = bincode::serialize(entry)?;
        if raw.len() > threshold {
            let compressed = lz4::block::compress(&raw, None, true)
                .map_err(|e| CacheError::InvalidPayload(e.to_string()))?;
            let mut out = Vec::with_capacity(compressed.len() + 1);
            out.push(COMPRESSED_FLAG);
            out.extend_from_slice(&compressed);
            Ok(out)
        } else {
            let mut out = Vec::with_capacity(raw.len() + 1);
            out.push(RAW_FLAG);
            out.extend_from_slice(&raw);
            Ok(out)
        }
    }

    fn decode(raw: &[u8]) -> CacheResult<Entry<T>> {
        let (flag, body) = raw.split_first().ok_or_else(|| CacheError::InvalidPayload("empty record".into()))?;
        let decompressed;
        let payload: &[u8] = if *flag == COMPRESSED_FLAG {
            decompressed = lz4::block::decompress(body, None).map_err(|e| CacheError::InvalidPayload(e.to_string()))?;
            &decompressed
        } else {
            body
        };
        Ok(bincode::deserialize(payload)?)
    }
}
