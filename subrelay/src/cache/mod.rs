//! Two-layer subtitle cache and in-flight deduplication.
//!
//! The memory layer is a bounded LRU over rendered bilingual WebVTT keyed by
//! request key; the store layer is the most recent DONE job row for that
//! key. Hits and misses are counted in the metadata table.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::warn;

use crate::database::models::JobKey;
use crate::database::repositories::{JobRepository, MetadataRepository};
use crate::Result;

struct MemoryEntry {
    bilingual: String,
    expires_at: Instant,
}

/// Bounded in-memory LRU with per-entry TTL.
pub struct MemoryCache {
    inner: Mutex<LruCache<String, MemoryEntry>>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1"),
            )),
            ttl,
        }
    }

    /// Look up a cached track. Returns None if absent or expired.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut cache = self.inner.lock();
        if let Some(entry) = cache.get(key) {
            if Instant::now() < entry.expires_at {
                return Some(entry.bilingual.clone());
            }
            cache.pop(key);
        }
        None
    }

    pub fn insert(&self, key: String, bilingual: String) {
        self.insert_for(key, bilingual, self.ttl);
    }

    /// Insert with an explicit lifetime, capped at the cache TTL.
    ///
    /// Promotions from the store pass the backing row's remaining life so a
    /// memory entry never outlives its row.
    pub fn insert_for(&self, key: String, bilingual: String, lifetime: Duration) {
        let mut cache = self.inner.lock();
        cache.put(
            key,
            MemoryEntry {
                bilingual,
                expires_at: Instant::now() + lifetime.min(self.ttl),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a cache hit was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLayer {
    Memory,
    Store,
}

/// Two-layer cache: LRU in front of the job store.
pub struct SubtitleCache {
    memory: MemoryCache,
    jobs: Arc<dyn JobRepository>,
    metadata: Arc<dyn MetadataRepository>,
}

impl SubtitleCache {
    pub fn new(
        memory: MemoryCache,
        jobs: Arc<dyn JobRepository>,
        metadata: Arc<dyn MetadataRepository>,
    ) -> Self {
        Self {
            memory,
            jobs,
            metadata,
        }
    }

    /// Look up the bilingual track for a request key.
    ///
    /// Memory hits and store hits both count as `cache_hits`; store hits are
    /// promoted into the memory layer. A total miss counts as
    /// `cache_misses`.
    pub async fn get(&self, key: &JobKey) -> Result<Option<(String, CacheLayer)>> {
        let cache_key = key.cache_key();

        if let Some(bilingual) = self.memory.get(&cache_key) {
            self.bump("cache_hits").await;
            return Ok(Some((bilingual, CacheLayer::Memory)));
        }

        if let Some(row) = self.jobs.find_latest_done(key).await? {
            let remaining_ms = (row.expires_at - crate::database::time::now_ms()).max(0);
            if let Some(bilingual) = row.bilingual.filter(|b| !b.is_empty()) {
                self.memory.insert_for(
                    cache_key,
                    bilingual.clone(),
                    Duration::from_millis(remaining_ms as u64),
                );
                self.bump("cache_hits").await;
                return Ok(Some((bilingual, CacheLayer::Store)));
            }
        }

        self.bump("cache_misses").await;
        Ok(None)
    }

    /// Write a finished track into the memory layer.
    ///
    /// The durable copy lives on the job row, written by the worker;
    /// `expires_at_ms` is that row's expiry.
    pub fn put(&self, key: &JobKey, bilingual: String, expires_at_ms: i64) {
        let remaining_ms = (expires_at_ms - crate::database::time::now_ms()).max(0);
        self.memory.insert_for(
            key.cache_key(),
            bilingual,
            Duration::from_millis(remaining_ms as u64),
        );
    }

    pub fn memory_entries(&self) -> usize {
        self.memory.len()
    }

    /// Counter bumps are best-effort: a failed increment never fails a
    /// request.
    async fn bump(&self, counter: &str) {
        if let Err(e) = self.metadata.increment(counter).await {
            warn!(counter, error = %e, "Failed to increment cache counter");
        }
    }
}

/// In-memory set of (cache key, source hash) pairs with a job in flight.
///
/// Checked before enqueue so concurrent identical misses produce one job;
/// the store's unique index backs this up across restarts.
#[derive(Clone, Default)]
pub struct InFlightSet {
    inner: Arc<DashMap<(String, String), ()>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim a slot. Returns `false` when the pair is already in
    /// flight.
    pub fn insert(&self, key: &JobKey, source_hash: &str) -> bool {
        match self
            .inner
            .entry((key.cache_key(), source_hash.to_string()))
        {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(());
                true
            }
        }
    }

    pub fn remove(&self, key: &JobKey, source_hash: &str) {
        self.inner
            .remove(&(key.cache_key(), source_hash.to_string()));
    }

    pub fn contains(&self, key: &JobKey, source_hash: &str) -> bool {
        self.inner
            .contains_key(&(key.cache_key(), source_hash.to_string()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> JobKey {
        JobKey::new("dQw4w9WgXcQ", "en", "zh-CN", "asr", "json3")
    }

    #[test]
    fn test_memory_cache_insert_and_get() {
        let cache = MemoryCache::new(10, Duration::from_secs(60));
        cache.insert("k".into(), "WEBVTT".into());
        assert_eq!(cache.get("k").as_deref(), Some("WEBVTT"));
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_memory_cache_ttl_expiry() {
        let cache = MemoryCache::new(10, Duration::from_millis(10));
        cache.insert("k".into(), "v".into());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_memory_cache_evicts_lru() {
        let cache = MemoryCache::new(2, Duration::from_secs(60));
        cache.insert("a".into(), "1".into());
        cache.insert("b".into(), "2".into());
        cache.insert("c".into(), "3".into());
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_in_flight_dedup() {
        let set = InFlightSet::new();
        let key = test_key();

        assert!(set.insert(&key, "hash1"));
        assert!(!set.insert(&key, "hash1"));
        // A different source hash is a different unit of work.
        assert!(set.insert(&key, "hash2"));

        set.remove(&key, "hash1");
        assert!(!set.contains(&key, "hash1"));
        assert!(set.insert(&key, "hash1"));
        assert_eq!(set.len(), 2);
    }
}
