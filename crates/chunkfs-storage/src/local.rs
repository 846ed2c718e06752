//! Chunk store backed by a local directory, one file per chunk.
//!
//! Lets chunks outlive the process that uploaded them. Chunk names are
//! percent-encoded into file names and every write goes through a temporary
//! file that is renamed into place.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info};

use crate::digest::{compute_digest, ChunkDigest};
use crate::error::{StorageError, StorageResult};
use crate::store::ChunkStore;

const CHUNK_SUFFIX: &str = ".chunk";

/// Chunk store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalDirChunkStore {
    root: PathBuf,
}

impl LocalDirChunkStore {
    /// Open a store at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!(root = %root.display(), "Opened local chunk store");
        Ok(Self { root })
    }

    /// Directory holding the chunk files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path used for a chunk name.
    pub fn chunk_path(&self, name: &str) -> StorageResult<PathBuf> {
        if name.is_empty() {
            return Err(StorageError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.root.join(format!("{}{}", encode_chunk_name(name), CHUNK_SUFFIX)))
    }
}

/// Percent-encode a chunk name into a single file name component. Only
/// `[A-Za-z0-9._~-]` pass through unchanged.
pub fn encode_chunk_name(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

impl ChunkStore for LocalDirChunkStore {
    fn upload_chunk(&self, name: &str, data: &[u8]) -> StorageResult<ChunkDigest> {
        let path = self.chunk_path(name)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;

        debug!(name, path = %path.display(), size = data.len(), "local store upload");
        Ok(compute_digest(data))
    }

    fn download_chunk(&self, name: &str) -> StorageResult<Bytes> {
        let path = self.chunk_path(name)?;
        match fs::read(&path) {
            Ok(data) => {
                debug!(name, size = data.len(), "local store download");
                Ok(Bytes::from(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::ChunkNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "local-dir"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_chunk_name() {
        assert_eq!(encode_chunk_name("abc-0"), "abc-0");
        assert_eq!(encode_chunk_name("b/c.txt-1"), "b%2Fc.txt-1");
        assert_eq!(encode_chunk_name("a b"), "a%20b");
        assert_eq!(encode_chunk_name(".."), "..");
        assert_eq!(encode_chunk_name("x~y"), "x~y");
        assert_eq!(encode_chunk_name("%2F"), "%252F");
        assert_eq!(encode_chunk_name("é"), "%C3%A9");
    }

    #[test]
    fn test_distinct_names_never_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirChunkStore::open(dir.path()).unwrap();
        store.upload_chunk("a/b-0", b"slash").unwrap();
        store.upload_chunk("a%2Fb-0", b"literal").unwrap();
        assert_eq!(&store.download_chunk("a/b-0").unwrap()[..], b"slash");
        assert_eq!(&store.download_chunk("a%2Fb-0").unwrap()[..], b"literal");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirChunkStore::open(dir.path().join("store")).unwrap();
        let digest = store.upload_chunk("dir/file-0", b"bytes on disk").unwrap();
        assert_eq!(digest, compute_digest(b"bytes on disk"));
        assert_eq!(&store.download_chunk("dir/file-0").unwrap()[..], b"bytes on disk");
        assert!(store.chunk_path("dir/file-0").unwrap().exists());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalDirChunkStore::open(dir.path()).unwrap();
            store.upload_chunk("k-0", b"persisted").unwrap();
        }
        let store = LocalDirChunkStore::open(dir.path()).unwrap();
        assert_eq!(&store.download_chunk("k-0").unwrap()[..], b"persisted");
    }

    #[test]
    fn test_missing_chunk_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirChunkStore::open(dir.path()).unwrap();
        assert!(store.download_chunk("missing-0").unwrap_err().is_not_found());
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirChunkStore::open(dir.path()).unwrap();
        store.upload_chunk("k-0", b"first").unwrap();
        store.upload_chunk("k-0", b"second").unwrap();
        assert_eq!(&store.download_chunk("k-0").unwrap()[..], b"second");
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirChunkStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.upload_chunk("", b"x"),
            Err(StorageError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_empty_payload_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirChunkStore::open(dir.path()).unwrap();
        store.upload_chunk("e-0", b"").unwrap();
        assert!(store.download_chunk("e-0").unwrap().is_empty());
    }
}
