//! In-memory chunk store for tests and single-process use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::digest::{compute_digest, ChunkDigest};
use crate::error::{StorageError, StorageResult};
use crate::store::ChunkStore;

/// Statistics for the memory store.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStoreStats {
    /// Successful upload operations.
    pub uploads: u64,
    /// Successful download operations.
    pub downloads: u64,
    /// Bytes currently held.
    pub bytes_stored: u64,
}

/// Chunk store that keeps every payload in a map.
///
/// Supports fault injection: the whole store can be marked unavailable and
/// individual stored chunks can be corrupted in place.
pub struct MemoryChunkStore {
    chunks: Mutex<HashMap<String, Bytes>>,
    stats: Mutex<MemoryStoreStats>,
    unavailable: AtomicBool,
}

impl MemoryChunkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            chunks: Mutex::new(HashMap::new()),
            stats: Mutex::new(MemoryStoreStats::default()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Snapshot of operation counters.
    pub fn stats(&self) -> MemoryStoreStats {
        self.stats.lock().clone()
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }

    /// True if a chunk is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.chunks.lock().contains_key(name)
    }

    /// Sorted list of stored chunk names.
    pub fn chunk_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.chunks.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Make every subsequent operation fail with [`StorageError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Flip every bit of the byte at `offset` in the stored chunk.
    /// Returns false if the chunk or offset does not exist.
    pub fn corrupt_chunk(&self, name: &str, offset: usize) -> bool {
        let mut chunks = self.chunks.lock();
        let Some(stored) = chunks.get_mut(name) else {
            return false;
        };
        if offset >= stored.len() {
            return false;
        }
        let mut data = stored.to_vec();
        data[offset] ^= 0xFF;
        *stored = Bytes::from(data);
        true
    }

    /// Drop a stored chunk. Returns true if it existed.
    pub fn remove_chunk(&self, name: &str) -> bool {
        let removed = self.chunks.lock().remove(name);
        if let Some(data) = &removed {
            let mut stats = self.stats.lock();
            stats.bytes_stored = stats.bytes_stored.saturating_sub(data.len() as u64);
        }
        removed.is_some()
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "memory store marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for MemoryChunkStore {
    fn upload_chunk(&self, name: &str, data: &[u8]) -> StorageResult<ChunkDigest> {
        self.check_available()?;
        let digest = compute_digest(data);
        let previous = self
            .chunks
            .lock()
            .insert(name.to_string(), Bytes::copy_from_slice(data));

        let mut stats = self.stats.lock();
        stats.uploads += 1;
        let replaced = previous.map(|p| p.len() as u64).unwrap_or(0);
        stats.bytes_stored = stats
            .bytes_stored
            .saturating_sub(replaced)
            .saturating_add(data.len() as u64);

        debug!(name, size = data.len(), "memory store upload");
        Ok(digest)
    }

    fn download_chunk(&self, name: &str) -> StorageResult<Bytes> {
        self.check_available()?;
        let data = self
            .chunks
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::ChunkNotFound {
                name: name.to_string(),
            })?;
        self.stats.lock().downloads += 1;
        debug!(name, size = data.len(), "memory store download");
        Ok(data)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_then_download() {
        let store = MemoryChunkStore::new();
        let digest = store.upload_chunk("f-0", b"payload").unwrap();
        assert_eq!(digest, compute_digest(b"payload"));
        assert_eq!(&store.download_chunk("f-0").unwrap()[..], b"payload");
    }

    #[test]
    fn test_missing_chunk_is_not_found() {
        let store = MemoryChunkStore::new();
        let err = store.download_chunk("nope").unwrap_err();
        assert!(matches!(err, StorageError::ChunkNotFound { name } if name == "nope"));
    }

    #[test]
    fn test_reupload_overwrites() {
        let store = MemoryChunkStore::new();
        store.upload_chunk("f-0", b"old data").unwrap();
        store.upload_chunk("f-0", b"new").unwrap();
        assert_eq!(&store.download_chunk("f-0").unwrap()[..], b"new");
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().bytes_stored, 3);
        assert_eq!(store.stats().uploads, 2);
    }

    #[test]
    fn test_unavailable_fails_both_directions() {
        let store = MemoryChunkStore::new();
        store.upload_chunk("f-0", b"x").unwrap();
        store.set_unavailable(true);
        assert!(matches!(
            store.upload_chunk("f-1", b"y"),
            Err(StorageError::Unavailable { .. })
        ));
        assert!(matches!(
            store.download_chunk("f-0"),
            Err(StorageError::Unavailable { .. })
        ));
        store.set_unavailable(false);
        assert!(store.download_chunk("f-0").is_ok());
    }

    #[test]
    fn test_corrupt_chunk_changes_payload() {
        let store = MemoryChunkStore::new();
        let digest = store.upload_chunk("f-0", b"abcd").unwrap();
        assert!(store.corrupt_chunk("f-0", 2));
        let data = store.download_chunk("f-0").unwrap();
        assert_ne!(compute_digest(&data), digest);
        assert!(!store.corrupt_chunk("f-0", 10));
        assert!(!store.corrupt_chunk("missing", 0));
    }

    #[test]
    fn test_remove_chunk() {
        let store = MemoryChunkStore::new();
        store.upload_chunk("a", b"123").unwrap();
        assert!(store.remove_chunk("a"));
        assert!(!store.remove_chunk("a"));
        assert!(store.is_empty());
        assert_eq!(store.stats().bytes_stored, 0);
    }

    #[test]
    fn test_chunk_names_sorted() {
        let store = MemoryChunkStore::new();
        store.upload_chunk("b-1", b"x").unwrap();
        store.upload_chunk("a-0", b"x").unwrap();
        assert_eq!(store.chunk_names(), vec!["a-0".to_string(), "b-1".to_string()]);
    }

    #[test]
    fn test_concurrent_uploads_of_distinct_names() {
        let store = std::sync::Arc::new(MemoryChunkStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.upload_chunk(&format!("f-{i}"), &[i as u8; 16]).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 8);
        assert_eq!(store.stats().bytes_stored, 128);
    }
}
