//! Error types for the transfer subsystem

use chunkfs_storage::{ChunkDigest, StorageError};

/// Result type alias for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// All errors that can occur while chunking, uploading or reassembling files
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Chunker configuration is unusable
    #[error("Invalid chunker configuration: {reason}")]
    InvalidConfig {
        /// Which setting is wrong
        reason: String,
    },
    /// Local source file does not exist
    #[error("File not found: {path}")]
    FileNotFound {
        /// The missing path
        path: String,
    },
    /// Local source path is not a regular file
    #[error("Not a regular file: {path}")]
    NotAFile {
        /// The offending path
        path: String,
    },
    /// No manifest is indexed under this name
    #[error("File not indexed: {name}")]
    NotIndexed {
        /// The file identity that was looked up
        name: String,
    },
    /// The store holds no chunk under this name
    #[error("Chunk not found in store: {name}")]
    ChunkNotFound {
        /// The missing chunk name
        name: String,
    },
    /// The store failed to transfer a chunk
    #[error("Transfer of chunk {name} failed: {source}")]
    Transfer {
        /// The chunk being transferred
        name: String,
        /// Underlying store error
        #[source]
        source: StorageError,
    },
    /// Downloaded chunk does not match its recorded digest
    #[error("Integrity check failed for chunk {name}: expected {expected}, got {actual}")]
    Integrity {
        /// The corrupted chunk
        name: String,
        /// Digest recorded at upload time
        expected: ChunkDigest,
        /// Digest of the bytes actually received
        actual: ChunkDigest,
    },
    /// Manifest is internally inconsistent
    #[error("Invalid manifest for {path}: {reason}")]
    InvalidManifest {
        /// File the manifest describes
        path: String,
        /// Which invariant failed
        reason: String,
    },
    /// A transfer worker thread panicked
    #[error("Transfer worker failed: {reason}")]
    Worker {
        /// Panic description
        reason: String,
    },
    /// Index encode/decode failure
    #[error("Serialization error: {reason}")]
    Serialization {
        /// Description of the failure
        reason: String,
    },
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Classify a store error raised while moving chunk `name`.
    pub fn from_storage(name: &str, source: StorageError) -> Self {
        match source {
            StorageError::ChunkNotFound { .. } => TransferError::ChunkNotFound {
                name: name.to_string(),
            },
            other => TransferError::Transfer {
                name: name.to_string(),
                source: other,
            },
        }
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(e: serde_json::Error) -> Self {
        TransferError::Serialization {
            reason: e.to_string(),
        }
    }
}
