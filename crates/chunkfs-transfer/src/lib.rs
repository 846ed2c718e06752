#![warn(missing_docs)]

//! ChunkFS transfer subsystem: bounded-size chunking, verified parallel
//! chunk transfer, chunk manifests and the whole-file controller.

pub mod chunker;
pub mod controller;
pub mod error;
pub mod manifest;

pub use chunker::{
    chunk_name, ChunkPayload, Chunker, ChunkerConfig, SplitChunks, DEFAULT_MAX_CHUNK_SIZE,
    DEFAULT_PARALLELISM, GIB, KIB, MIB,
};
pub use controller::{chunk_prefix, FileController, UploadSummary, INDEX_FORMAT_VERSION};
pub use error::{TransferError, TransferResult};
pub use manifest::{ChunkDescriptor, ChunkSpan, FileChunkManifest};
