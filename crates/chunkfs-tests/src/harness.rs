//! Test Harness - temporary directories, sample trees and chunk-backed mounts

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chunkfs_fuse::{ChunkCacheConfig, ChunkContent, FilesystemAdapter, PlaceholderContent};
use chunkfs_meta::DirectoryTree;
use chunkfs_storage::MemoryChunkStore;
use chunkfs_transfer::{ChunkerConfig, FileController};
use tempfile::TempDir;
use tracing::debug;

/// Content of `a.txt` in the sample tree (12 bytes).
pub const SAMPLE_A: &[u8] = b"hello world!";

#[derive(Debug)]
pub struct TestEnv {
    temp_dir: TempDir,
    test_name: String,
}

impl TestEnv {
    pub fn new(test_name: &str) -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        Self {
            temp_dir,
            test_name: test_name.to_string(),
        }
    }

    pub fn tempdir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Directory the sample data lives in.
    pub fn data_dir(&self) -> PathBuf {
        self.tempdir().join("data")
    }

    /// Write `data` at `rel` under the data directory, creating parents.
    pub fn write_file(&self, rel: &str, data: &[u8]) -> PathBuf {
        let path = self.data_dir().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dir");
        }
        fs::write(&path, data).expect("failed to write file");
        path
    }

    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.data_dir().join(rel);
        fs::create_dir_all(&path).expect("failed to create dir");
        path
    }

    /// `a.txt` (12 bytes) and `b/c.txt` (empty).
    pub fn sample_tree(&self) -> DirectoryTree {
        self.write_file("a.txt", SAMPLE_A);
        self.write_file("b/c.txt", b"");
        self.scan()
    }

    pub fn scan(&self) -> DirectoryTree {
        DirectoryTree::from_path(&self.data_dir()).expect("scan failed")
    }

    /// Scan the data directory, upload every file and mount the result.
    pub fn chunked_mount(&self, max_chunk_size: usize) -> ChunkedMount {
        let tree = self.scan();
        ChunkedMount::new(tree, &self.data_dir(), max_chunk_size)
    }

    /// Adapter over the scanned data directory with placeholder content.
    pub fn placeholder_mount(&self) -> FilesystemAdapter {
        FilesystemAdapter::new(self.scan(), Arc::new(PlaceholderContent))
    }
}

/// A tree uploaded into an in-memory store and mounted with chunk content.
pub struct ChunkedMount {
    pub store: Arc<MemoryChunkStore>,
    pub controller: Arc<FileController>,
    pub adapter: Arc<FilesystemAdapter>,
}

impl ChunkedMount {
    pub fn new(tree: DirectoryTree, root_dir: &Path, max_chunk_size: usize) -> Self {
        let store = Arc::new(MemoryChunkStore::new());
        let controller = Arc::new(
            FileController::new(ChunkerConfig::with_max_chunk_size(max_chunk_size), store.clone())
                .expect("invalid chunker config"),
        );
        let summary = controller
            .upload_tree(&tree, root_dir)
            .expect("tree upload failed");
        debug!(files = summary.files, chunks = summary.chunks, "test tree uploaded");

        let content = ChunkContent::new(controller.clone(), ChunkCacheConfig::with_max_chunks(16));
        let adapter = Arc::new(FilesystemAdapter::new(tree, Arc::new(content)));
        Self {
            store,
            controller,
            adapter,
        }
    }

    /// Open `path`, read it whole in `step`-sized reads, and release.
    pub fn read_all(&self, path: &str, step: u64) -> chunkfs_fuse::Result<Vec<u8>> {
        let fh = self.adapter.open_file(path)?;
        let mut out = Vec::new();
        let result = loop {
            match self.adapter.read(fh, out.len() as u64, step) {
                Ok(data) if data.is_empty() => break Ok(()),
                Ok(data) => out.extend_from_slice(&data),
                Err(e) => break Err(e),
            }
        };
        self.adapter.release(fh)?;
        result.map(|()| out)
    }
}
