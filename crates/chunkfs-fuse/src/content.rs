//! File content sources behind the adapter's read path.
//!
//! The adapter resolves metadata itself and asks a [`ContentSource`] for the
//! bytes of a file. Two sources exist: a deterministic placeholder, and
//! chunk-backed content fetched lazily through the [`FileController`].

use std::sync::Arc;

use bytes::Bytes;
use chunkfs_meta::FileNode;
use chunkfs_transfer::{ChunkDescriptor, FileController, TransferError};
use parking_lot::Mutex;
use tracing::debug;

use crate::datacache::{ChunkCache, ChunkCacheConfig, ChunkCacheStats};
use crate::error::{FuseError, Result};

/// The parts of a file node a content source needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Base name.
    pub name: String,
    /// Tree path; the file identity in the chunk index.
    pub path: String,
    /// Size recorded in the tree.
    pub size: u64,
}

impl From<&FileNode> for FileRef {
    fn from(node: &FileNode) -> Self {
        Self {
            name: node.name.clone(),
            path: node.path.clone(),
            size: node.size,
        }
    }
}

/// Supplies file bytes for the adapter.
pub trait ContentSource: Send + Sync {
    /// Number of bytes `read` serves for this file.
    fn content_len(&self, file: &FileRef) -> u64;

    /// Check that the file can be served. Called once per open.
    fn open(&self, file: &FileRef) -> Result<()>;

    /// Bytes in `[offset, offset + len)`, clamped to the content length.
    /// Past the end the result is empty.
    fn read(&self, file: &FileRef, offset: u64, len: u64) -> Result<Bytes>;

    /// Short name for logs.
    fn kind(&self) -> &'static str;
}

/// Serves `"This is the content of <name>\n"` for every file.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderContent;

impl PlaceholderContent {
    fn render(file: &FileRef) -> String {
        format!("This is the content of {}\n", file.name)
    }
}

impl ContentSource for PlaceholderContent {
    fn content_len(&self, file: &FileRef) -> u64 {
        Self::render(file).len() as u64
    }

    fn open(&self, _file: &FileRef) -> Result<()> {
        Ok(())
    }

    fn read(&self, file: &FileRef, offset: u64, len: u64) -> Result<Bytes> {
        let content = Self::render(file).into_bytes();
        Ok(Bytes::from(slice_range(&content, offset, len).to_vec()))
    }

    fn kind(&self) -> &'static str {
        "placeholder"
    }
}

fn slice_range(data: &[u8], offset: u64, len: u64) -> &[u8] {
    let total = data.len() as u64;
    if offset >= total {
        return &[];
    }
    let end = offset.saturating_add(len).min(total);
    &data[offset as usize..end as usize]
}

/// Chunk-backed content. Only chunks overlapping a read are fetched, and
/// verified payloads are kept in an LRU cache.
pub struct ChunkContent {
    controller: Arc<FileController>,
    cache: Mutex<ChunkCache>,
}

impl ChunkContent {
    pub fn new(controller: Arc<FileController>, cache: ChunkCacheConfig) -> Self {
        Self {
            controller,
            cache: Mutex::new(ChunkCache::new(cache)),
        }
    }

    pub fn controller(&self) -> &Arc<FileController> {
        &self.controller
    }

    pub fn cache_stats(&self) -> ChunkCacheStats {
        self.cache.lock().stats().clone()
    }

    fn chunk(&self, descriptor: &ChunkDescriptor) -> Result<Bytes> {
        if let Some(data) = self.cache.lock().get(&descriptor.name, &descriptor.digest) {
            return Ok(data);
        }
        // The cache lock is not held while the chunk is fetched.
        let data = self.controller.fetch_chunk(descriptor)?;
        self.cache
            .lock()
            .insert(&descriptor.name, descriptor.digest, data.clone());
        Ok(data)
    }

    fn unavailable(file: &FileRef, err: TransferError) -> FuseError {
        match err {
            TransferError::NotIndexed { .. } => FuseError::ContentUnavailable {
                path: file.path.clone(),
                reason: "file has not been uploaded".to_string(),
            },
            other => FuseError::Transfer(other),
        }
    }
}

impl ContentSource for ChunkContent {
    fn content_len(&self, file: &FileRef) -> u64 {
        self.controller
            .manifest(&file.path)
            .map(|m| m.total_size)
            .unwrap_or(file.size)
    }

    fn open(&self, file: &FileRef) -> Result<()> {
        self.controller
            .manifest(&file.path)
            .map(|_| ())
            .map_err(|e| Self::unavailable(file, e))
    }

    fn read(&self, file: &FileRef, offset: u64, len: u64) -> Result<Bytes> {
        let manifest = self
            .controller
            .manifest(&file.path)
            .map_err(|e| Self::unavailable(file, e))?;
        debug!(path = %file.path, offset, len, "chunk read");
        manifest.read_with(offset, len, |chunk| self.chunk(chunk))
    }

    fn kind(&self) -> &'static str {
        "chunk"
    }
}
