#![warn(missing_docs)]

//! ChunkFS storage subsystem: the named chunk store contract, BLAKE3
//! content digests, and the in-memory and local-directory backends.

pub mod digest;
pub mod error;
pub mod local;
pub mod memory;
pub mod store;

pub use digest::{compute_digest, ChunkDigest};
pub use error::{StorageError, StorageResult};
pub use local::LocalDirChunkStore;
pub use memory::{MemoryChunkStore, MemoryStoreStats};
pub use store::ChunkStore;
