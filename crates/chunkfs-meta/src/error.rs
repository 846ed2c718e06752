//! Error types for the metadata subsystem

use thiserror::Error;

/// Result type alias for metadata operations.
pub type MetaResult<T> = Result<T, MetaError>;

/// Errors raised while building, resolving or persisting a directory tree.
#[derive(Debug, Error)]
pub enum MetaError {
    /// No node matches the requested path.
    #[error("Path not found: {path}")]
    NotFound {
        /// The path that failed to resolve.
        path: String,
    },

    /// A directory operation was attempted on a file.
    #[error("Not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: String,
    },

    /// A file operation was attempted on a directory.
    #[error("Is a directory: {path}")]
    IsADirectory {
        /// The offending path.
        path: String,
    },

    /// Snapshot encoding or decoding failed.
    #[error("Serialization error: {reason}")]
    Serialization {
        /// Description of the failure.
        reason: String,
    },

    /// A loaded tree violates a structural invariant.
    #[error("Invalid tree at {path:?}: {reason}")]
    InvalidTree {
        /// Path of the node that failed validation.
        path: String,
        /// Which invariant was violated.
        reason: String,
    },

    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for MetaError {
    fn from(e: serde_json::Error) -> Self {
        MetaError::Serialization {
            reason: e.to_string(),
        }
    }
}
