//! Fixed-bound chunking and verified chunk transfer.
//!
//! Upload path:   Read → split into ≤ max_chunk_size pieces → upload batch → manifest
//! Download path: manifest → fetch batch → verify digest → write in sequence order

use std::io::{self, Read, Write};
use std::thread;

use bytes::Bytes;
use chunkfs_storage::{compute_digest, ChunkStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{TransferError, TransferResult};
use crate::manifest::{ChunkDescriptor, FileChunkManifest};

/// 1 KiB
pub const KIB: u64 = 1024;
/// 1 MiB
pub const MIB: u64 = 1024 * KIB;
/// 1 GiB
pub const GIB: u64 = 1024 * MIB;

/// Default upper bound on a chunk payload.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = (4 * MIB) as usize;
/// Default number of chunks transferred concurrently.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Upper bound on the buffer reserved up front by [`Chunker::download`].
const DOWNLOAD_PREALLOC_LIMIT: u64 = 64 * MIB;

/// Configuration for the chunker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Largest payload of any single chunk in bytes
    pub max_chunk_size: usize,
    /// Chunks uploaded or downloaded at once
    pub parallelism: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl ChunkerConfig {
    /// Config with the given chunk bound and default parallelism
    pub fn with_max_chunk_size(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size,
            ..Default::default()
        }
    }

    /// Both settings must be positive.
    pub fn validate(&self) -> TransferResult<()> {
        if self.max_chunk_size == 0 {
            return Err(TransferError::InvalidConfig {
                reason: "max_chunk_size must be positive".to_string(),
            });
        }
        if self.parallelism == 0 {
            return Err(TransferError::InvalidConfig {
                reason: "parallelism must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// A chunk payload produced by [`Chunker::split`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPayload {
    /// 0-based position in the source
    pub sequence_index: u64,
    /// Chunk content
    pub data: Bytes,
}

/// Iterator over consecutive bounded chunks of a byte source.
///
/// Every chunk except the last is exactly `max_chunk_size` bytes; short reads
/// from the source are retried until a chunk is full or the source ends.
pub struct SplitChunks<R> {
    source: R,
    max_chunk_size: usize,
    next_index: u64,
    done: bool,
}

impl<R: Read> Iterator for SplitChunks<R> {
    type Item = io::Result<ChunkPayload>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = vec![0u8; self.max_chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        if filled < buf.len() {
            self.done = true;
        }
        if filled == 0 {
            return None;
        }

        buf.truncate(filled);
        let payload = ChunkPayload {
            sequence_index: self.next_index,
            data: Bytes::from(buf),
        };
        self.next_index += 1;
        Some(Ok(payload))
    }
}

/// Name of chunk `sequence_index` of a file uploaded with `prefix`.
pub fn chunk_name(prefix: &str, sequence_index: u64) -> String {
    format!("{}-{}", prefix, sequence_index)
}

/// Splits byte sources into bounded chunks and moves them through a store
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a chunker; the configuration is validated.
    pub fn new(config: ChunkerConfig) -> TransferResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `source` into consecutive chunks. An empty source yields none.
    pub fn split<R: Read>(&self, source: R) -> SplitChunks<R> {
        SplitChunks {
            source,
            max_chunk_size: self.config.max_chunk_size,
            next_index: 0,
            done: false,
        }
    }

    /// Split `source` and upload every chunk as `name_prefix-<index>`.
    ///
    /// The returned manifest's `path` is `name_prefix`. On failure, chunks
    /// already uploaded stay in the store; a retry overwrites them.
    #[instrument(skip(self, source, store), fields(backend = store.backend_name()))]
    pub fn upload<R: Read>(
        &self,
        source: R,
        name_prefix: &str,
        store: &dyn ChunkStore,
    ) -> TransferResult<FileChunkManifest> {
        let mut chunks = Vec::new();
        let mut batch = Vec::with_capacity(self.config.parallelism);

        for payload in self.split(source) {
            batch.push(payload?);
            if batch.len() == self.config.parallelism {
                chunks.extend(upload_batch(&batch, name_prefix, store)?);
                batch.clear();
            }
        }
        if !batch.is_empty() {
            chunks.extend(upload_batch(&batch, name_prefix, store)?);
        }

        let manifest = FileChunkManifest::new(name_prefix, chunks);
        debug!(
            chunks = manifest.chunk_count(),
            total_size = manifest.total_size,
            "upload complete"
        );
        Ok(manifest)
    }

    /// Fetch every chunk and return the reassembled bytes.
    pub fn download(
        &self,
        manifest: &FileChunkManifest,
        store: &dyn ChunkStore,
    ) -> TransferResult<Vec<u8>> {
        manifest.validate()?;
        let prealloc = manifest.total_size.min(DOWNLOAD_PREALLOC_LIMIT) as usize;
        let mut out = Vec::with_capacity(prealloc);
        self.download_to(manifest, store, &mut out)?;
        Ok(out)
    }

    /// Fetch every chunk and write it to `writer` in sequence order.
    ///
    /// Chunks of a batch are fetched concurrently; output order depends only
    /// on `sequence_index`. An integrity failure aborts before the corrupted
    /// chunk is written.
    #[instrument(skip(self, manifest, store, writer), fields(path = %manifest.path, chunks = manifest.chunk_count()))]
    pub fn download_to<W: Write>(
        &self,
        manifest: &FileChunkManifest,
        store: &dyn ChunkStore,
        writer: &mut W,
    ) -> TransferResult<u64> {
        manifest.validate()?;

        let mut written = 0u64;
        for batch in manifest.chunks.chunks(self.config.parallelism) {
            for payload in fetch_batch(batch, store)? {
                writer.write_all(&payload)?;
                written += payload.len() as u64;
            }
        }
        debug!(written, "download complete");
        Ok(written)
    }

    /// Download one chunk and verify its digest and size.
    pub fn fetch_chunk(
        descriptor: &ChunkDescriptor,
        store: &dyn ChunkStore,
    ) -> TransferResult<Bytes> {
        let data = store
            .download_chunk(&descriptor.name)
            .map_err(|e| TransferError::from_storage(&descriptor.name, e))?;

        let actual = compute_digest(&data);
        if actual != descriptor.digest {
            return Err(TransferError::Integrity {
                name: descriptor.name.clone(),
                expected: descriptor.digest,
                actual,
            });
        }
        if data.len() as u64 != descriptor.size {
            return Err(TransferError::InvalidManifest {
                path: descriptor.name.clone(),
                reason: format!(
                    "chunk holds {} bytes, manifest records {}",
                    data.len(),
                    descriptor.size
                ),
            });
        }
        Ok(data)
    }
}

fn upload_one(
    payload: &ChunkPayload,
    prefix: &str,
    store: &dyn ChunkStore,
) -> TransferResult<ChunkDescriptor> {
    let name = chunk_name(prefix, payload.sequence_index);
    let digest = store
        .upload_chunk(&name, &payload.data)
        .map_err(|e| TransferError::from_storage(&name, e))?;
    debug!(chunk = %name, size = payload.data.len(), "chunk uploaded");
    Ok(ChunkDescriptor {
        name,
        digest,
        size: payload.data.len() as u64,
        sequence_index: payload.sequence_index,
    })
}

/// Upload a batch concurrently. Results come back in batch order, so the
/// first error reported belongs to the lowest failing sequence index.
fn upload_batch(
    batch: &[ChunkPayload],
    prefix: &str,
    store: &dyn ChunkStore,
) -> TransferResult<Vec<ChunkDescriptor>> {
    if batch.len() == 1 {
        return batch.iter().map(|p| upload_one(p, prefix, store)).collect();
    }
    let results: Vec<TransferResult<ChunkDescriptor>> = thread::scope(|s| {
        let handles: Vec<_> = batch
            .iter()
            .map(|p| s.spawn(move || upload_one(p, prefix, store)))
            .collect();
        handles.into_iter().map(join_worker).collect()
    });
    results.into_iter().collect()
}

/// Fetch a batch concurrently, returning payloads in batch order.
fn fetch_batch(batch: &[ChunkDescriptor], store: &dyn ChunkStore) -> TransferResult<Vec<Bytes>> {
    if batch.len() == 1 {
        return batch.iter().map(|d| Chunker::fetch_chunk(d, store)).collect();
    }
    let results: Vec<TransferResult<Bytes>> = thread::scope(|s| {
        let handles: Vec<_> = batch
            .iter()
            .map(|d| s.spawn(move || Chunker::fetch_chunk(d, store)))
            .collect();
        handles.into_iter().map(join_worker).collect()
    });
    results.into_iter().collect()
}

fn join_worker<T>(handle: thread::ScopedJoinHandle<'_, TransferResult<T>>) -> TransferResult<T> {
    handle.join().unwrap_or_else(|panic| {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(TransferError::Worker { reason })
    })
}
