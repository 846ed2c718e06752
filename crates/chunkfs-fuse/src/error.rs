use chunkfs_meta::MetaError;
use chunkfs_transfer::TransferError;
use thiserror::Error;

/// Errors surfaced through the filesystem adapter and the FUSE bridge.
#[derive(Debug, Error)]
pub enum FuseError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No node at this path.
    #[error("Path not found: {path}")]
    NotFound {
        /// The unresolved path.
        path: String,
    },

    /// Directory operation on a file.
    #[error("Not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: String,
    },

    /// File operation on a directory.
    #[error("Is a directory: {path}")]
    IsADirectory {
        /// The offending path.
        path: String,
    },

    /// Unknown or already released file handle.
    #[error("Bad file handle: {fh}")]
    BadHandle {
        /// The handle id.
        fh: u64,
    },

    /// Unknown inode number.
    #[error("Inode not found: {ino}")]
    InodeNotFound {
        /// The inode number.
        ino: u64,
    },

    /// Any write-side operation on the read-only mount.
    #[error("Read-only filesystem: {op} is not permitted")]
    ReadOnly {
        /// Rejected operation.
        op: String,
    },

    /// The file exists in the tree but has no content to serve.
    #[error("Content unavailable for {path}: {reason}")]
    ContentUnavailable {
        /// The file.
        path: String,
        /// Why no content can be served.
        reason: String,
    },

    /// Fetching chunk data failed.
    #[error("Chunk transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// Tree metadata could not be loaded.
    #[error("Metadata error: {0}")]
    Meta(MetaError),

    /// Invalid mount option or setting.
    #[error("Invalid argument: {msg}")]
    InvalidArgument {
        /// What was wrong.
        msg: String,
    },
}

/// Result alias for adapter and bridge operations.
pub type Result<T> = std::result::Result<T, FuseError>;

impl FuseError {
    /// Map the error to the errno replied to the kernel.
    pub fn to_errno(&self) -> i32 {
        use libc::*;
        match self {
            FuseError::Io(e) => e.raw_os_error().unwrap_or(EIO),
            FuseError::NotFound { .. } => ENOENT,
            FuseError::NotADirectory { .. } => ENOTDIR,
            FuseError::IsADirectory { .. } => EISDIR,
            FuseError::BadHandle { .. } => EBADF,
            FuseError::InodeNotFound { .. } => ENOENT,
            FuseError::ReadOnly { .. } => EROFS,
            FuseError::ContentUnavailable { .. } => EIO,
            FuseError::Transfer(_) => EIO,
            FuseError::Meta(_) => EIO,
            FuseError::InvalidArgument { .. } => EINVAL,
        }
    }
}

impl From<MetaError> for FuseError {
    fn from(e: MetaError) -> Self {
        match e {
            MetaError::NotFound { path } => FuseError::NotFound { path },
            MetaError::NotADirectory { path } => FuseError::NotADirectory { path },
            MetaError::IsADirectory { path } => FuseError::IsADirectory { path },
            MetaError::Io(e) => FuseError::Io(e),
            other => FuseError::Meta(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkfs_storage::compute_digest;

    #[test]
    fn test_not_found_errno() {
        let err = FuseError::NotFound {
            path: "a/b".to_string(),
        };
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_type_mismatch_errnos() {
        let path = "x".to_string();
        assert_eq!(
            FuseError::NotADirectory { path: path.clone() }.to_errno(),
            libc::ENOTDIR
        );
        assert_eq!(FuseError::IsADirectory { path }.to_errno(), libc::EISDIR);
    }

    #[test]
    fn test_bad_handle_errno() {
        assert_eq!(FuseError::BadHandle { fh: 9 }.to_errno(), libc::EBADF);
    }

    #[test]
    fn test_read_only_errno() {
        let err = FuseError::ReadOnly {
            op: "write".to_string(),
        };
        assert_eq!(err.to_errno(), libc::EROFS);
    }

    #[test]
    fn test_integrity_failure_is_eio() {
        let err: FuseError = TransferError::Integrity {
            name: "f-0".to_string(),
            expected: compute_digest(b"a"),
            actual: compute_digest(b"b"),
        }
        .into();
        assert_eq!(err.to_errno(), libc::EIO);
    }

    #[test]
    fn test_io_error_keeps_os_code() {
        let err = FuseError::Io(std::io::Error::from_raw_os_error(libc::EACCES));
        assert_eq!(err.to_errno(), libc::EACCES);
        let err = FuseError::Io(std::io::Error::other("boom"));
        assert_eq!(err.to_errno(), libc::EIO);
    }

    #[test]
    fn test_meta_error_conversion() {
        let err: FuseError = MetaError::NotADirectory {
            path: "a.txt".to_string(),
        }
        .into();
        assert!(matches!(err, FuseError::NotADirectory { ref path } if path == "a.txt"));

        let err: FuseError = MetaError::Serialization {
            reason: "bad".to_string(),
        }
        .into();
        assert!(matches!(err, FuseError::Meta(_)));
        assert_eq!(err.to_errno(), libc::EIO);
    }
}
