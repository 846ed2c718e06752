//! Error types for chunk store backends.

use thiserror::Error;

/// Result type alias for chunk store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error variants for chunk store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No chunk was ever stored under this name.
    #[error("Chunk not found: {name}")]
    ChunkNotFound {
        /// The chunk name that was not found.
        name: String,
    },

    /// The backend is unreachable or refused the operation.
    #[error("Store unavailable: {reason}")]
    Unavailable {
        /// Description of the failure.
        reason: String,
    },

    /// The chunk name cannot be stored by this backend.
    #[error("Invalid chunk name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// True when the error means the chunk does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::ChunkNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_not_found_display() {
        let err = StorageError::ChunkNotFound {
            name: "abc-0".to_string(),
        };
        assert_eq!(err.to_string(), "Chunk not found: abc-0");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unavailable_is_not_not_found() {
        let err = StorageError::Unavailable {
            reason: "connection refused".to_string(),
        };
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_io_error_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: StorageError = io_err.into();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
