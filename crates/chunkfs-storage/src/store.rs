//! The chunk store contract.

use bytes::Bytes;

use crate::digest::ChunkDigest;
use crate::error::StorageResult;

/// A remote store of named chunks.
///
/// Chunks are keyed by the caller-assigned name. Uploading a name that
/// already exists overwrites it, so retrying a failed upload is safe.
/// Transfers of different names are independent and may run concurrently.
pub trait ChunkStore: Send + Sync {
    /// Store `data` under `name` and return the digest of `data`.
    fn upload_chunk(&self, name: &str, data: &[u8]) -> StorageResult<ChunkDigest>;

    /// Return the payload stored under `name`.
    ///
    /// Fails with [`crate::StorageError::ChunkNotFound`] if nothing was stored.
    fn download_chunk(&self, name: &str) -> StorageResult<Bytes>;

    /// Short backend label for logging.
    fn backend_name(&self) -> &'static str;
}

impl<S: ChunkStore + ?Sized> ChunkStore for std::sync::Arc<S> {
    fn upload_chunk(&self, name: &str, data: &[u8]) -> StorageResult<ChunkDigest> {
        (**self).upload_chunk(name, data)
    }

    fn download_chunk(&self, name: &str) -> StorageResult<Bytes> {
        (**self).download_chunk(name)
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}
