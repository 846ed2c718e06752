//! LRU cache of verified chunk payloads for chunk-backed reads.

use bytes::Bytes;
use chunkfs_storage::ChunkDigest;
use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::debug;

/// Default number of cached chunks.
pub const DEFAULT_CACHE_CHUNKS: usize = 64;

#[derive(Debug, Clone)]
pub struct ChunkCacheConfig {
    pub max_chunks: usize,
    pub max_bytes: u64,
}

impl Default for ChunkCacheConfig {
    fn default() -> Self {
        Self {
            max_chunks: DEFAULT_CACHE_CHUNKS,
            max_bytes: 256 * 1024 * 1024,
        }
    }
}

impl ChunkCacheConfig {
    /// Config holding up to `max_chunks` chunks.
    pub fn with_max_chunks(max_chunks: usize) -> Self {
        Self {
            max_chunks,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
struct CachedChunk {
    digest: ChunkDigest,
    data: Bytes,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_bytes: u64,
    pub chunks: usize,
}

/// Chunks keyed by name. An entry is only served when its digest matches the
/// digest the caller expects, so a reloaded index never sees stale payloads.
pub struct ChunkCache {
    config: ChunkCacheConfig,
    cache: LruCache<String, CachedChunk>,
    total_bytes: u64,
    stats: ChunkCacheStats,
}

impl ChunkCache {
    pub fn new(config: ChunkCacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_chunks).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            cache: LruCache::new(cap),
            total_bytes: 0,
            stats: ChunkCacheStats::default(),
        }
    }

    /// Insert a verified payload. Returns false if it can never fit.
    pub fn insert(&mut self, name: &str, digest: ChunkDigest, data: Bytes) -> bool {
        let size = data.len() as u64;
        if size > self.config.max_bytes {
            return false;
        }

        if let Some(existing) = self.cache.pop(name) {
            self.total_bytes = self.total_bytes.saturating_sub(existing.data.len() as u64);
        }

        while self.total_bytes + size > self.config.max_bytes
            || self.cache.len() >= self.cache.cap().get()
        {
            match self.cache.pop_lru() {
                Some((evicted_name, evicted)) => {
                    self.total_bytes = self.total_bytes.saturating_sub(evicted.data.len() as u64);
                    self.stats.evictions += 1;
                    debug!(chunk = %evicted_name, "evicted cached chunk");
                }
                None => break,
            }
        }

        self.total_bytes += size;
        self.cache.put(name.to_string(), CachedChunk { digest, data });
        self.stats.total_bytes = self.total_bytes;
        self.stats.chunks = self.cache.len();
        true
    }

    /// Cached payload for `name`, if present with the expected digest.
    pub fn get(&mut self, name: &str, digest: &ChunkDigest) -> Option<Bytes> {
        let lookup = self
            .cache
            .get(name)
            .map(|entry| (entry.digest == *digest).then(|| entry.data.clone()));
        let hit = match lookup {
            Some(Some(data)) => Some(data),
            Some(None) => {
                self.invalidate(name);
                None
            }
            None => None,
        };
        if hit.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        hit
    }

    pub fn invalidate(&mut self, name: &str) {
        if let Some(entry) = self.cache.pop(name) {
            self.total_bytes = self.total_bytes.saturating_sub(entry.data.len() as u64);
            self.stats.total_bytes = self.total_bytes;
            self.stats.chunks = self.cache.len();
        }
    }

    pub fn stats(&self) -> &ChunkCacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.total_bytes = 0;
        self.stats = ChunkCacheStats::default();
    }
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new(ChunkCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkfs_storage::compute_digest;

    fn small_cache() -> ChunkCache {
        ChunkCache::new(ChunkCacheConfig {
            max_chunks: 3,
            max_bytes: 100,
        })
    }

    fn put(cache: &mut ChunkCache, name: &str, data: &[u8]) -> bool {
        cache.insert(name, compute_digest(data), Bytes::copy_from_slice(data))
    }

    #[test]
    fn test_get_after_insert() {
        let mut cache = small_cache();
        assert!(put(&mut cache, "a-0", b"abc"));
        let got = cache.get("a-0", &compute_digest(b"abc")).unwrap();
        assert_eq!(&got[..], b"abc");
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_miss_counts() {
        let mut cache = small_cache();
        assert!(cache.get("nope", &compute_digest(b"x")).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_digest_mismatch_invalidates() {
        let mut cache = small_cache();
        put(&mut cache, "a-0", b"old");
        assert!(cache.get("a-0", &compute_digest(b"new")).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_count_eviction_is_lru() {
        let mut cache = small_cache();
        put(&mut cache, "a", b"1");
        put(&mut cache, "b", b"2");
        put(&mut cache, "c", b"3");
        cache.get("a", &compute_digest(b"1"));
        put(&mut cache, "d", b"4");
        assert_eq!(cache.len(), 3);
        assert!(cache.get("b", &compute_digest(b"2")).is_none());
        assert!(cache.get("a", &compute_digest(b"1")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_byte_budget_eviction() {
        let mut cache = small_cache();
        put(&mut cache, "a", &[1u8; 60]);
        put(&mut cache, "b", &[2u8; 60]);
        assert_eq!(cache.len(), 1);
        assert!(cache.total_bytes() <= 100);
    }

    #[test]
    fn test_oversized_rejected() {
        let mut cache = small_cache();
        assert!(!put(&mut cache, "big", &[0u8; 101]));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reinsert_replaces_accounting() {
        let mut cache = small_cache();
        put(&mut cache, "a", &[1u8; 10]);
        put(&mut cache, "a", &[1u8; 20]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 20);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut cache = ChunkCache::new(ChunkCacheConfig::with_max_chunks(0));
        assert!(put(&mut cache, "a", b"x"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut cache = small_cache();
        put(&mut cache, "a", b"x");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), &ChunkCacheStats::default());
    }
}
