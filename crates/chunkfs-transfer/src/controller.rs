//! Whole-file orchestration over the chunker and the file chunk index.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chunkfs_meta::DirectoryTree;
use chunkfs_storage::{compute_digest, ChunkStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::chunker::{Chunker, ChunkerConfig};
use crate::error::{TransferError, TransferResult};
use crate::manifest::{ChunkDescriptor, FileChunkManifest};

/// Version written into index files.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Hex characters of the key digest used as a chunk name prefix.
const PREFIX_LEN: usize = 16;

/// Totals from uploading a whole tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Files uploaded
    pub files: usize,
    /// Chunks written to the store
    pub chunks: usize,
    /// Payload bytes written to the store
    pub bytes: u64,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    files: BTreeMap<String, FileChunkManifest>,
}

/// Chunk name prefix for a file identity: first 16 hex chars of its BLAKE3.
pub fn chunk_prefix(key: &str) -> String {
    let mut hex = compute_digest(key.as_bytes()).to_hex();
    hex.truncate(PREFIX_LEN);
    hex
}

/// Uploads and downloads whole files and keeps the file identity -> manifest
/// index. The index is populated only by successful uploads or by loading a
/// saved index.
pub struct FileController {
    chunker: Chunker,
    store: Arc<dyn ChunkStore>,
    index: RwLock<HashMap<String, Arc<FileChunkManifest>>>,
}

impl FileController {
    /// Create a controller over `store`.
    pub fn new(config: ChunkerConfig, store: Arc<dyn ChunkStore>) -> TransferResult<Self> {
        Ok(Self {
            chunker: Chunker::new(config)?,
            store,
            index: RwLock::new(HashMap::new()),
        })
    }

    /// The underlying chunker
    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// The backing store
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Upload a local file, indexed under `path` as given.
    pub fn upload_file(&self, path: &Path) -> TransferResult<Arc<FileChunkManifest>> {
        let key = path.to_string_lossy().into_owned();
        self.upload_file_as(path, &key)
    }

    /// Upload a local file, indexed under `key`.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn upload_file_as(&self, path: &Path, key: &str) -> TransferResult<Arc<FileChunkManifest>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TransferError::FileNotFound {
                    path: path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        if !file.metadata()?.is_file() {
            return Err(TransferError::NotAFile {
                path: path.display().to_string(),
            });
        }

        let prefix = chunk_prefix(key);
        let manifest = self
            .chunker
            .upload(BufReader::new(file), &prefix, self.store.as_ref())?
            .with_path(key);
        let manifest = Arc::new(manifest);

        self.index.write().insert(key.to_string(), Arc::clone(&manifest));
        info!(
            key,
            chunks = manifest.chunk_count(),
            size = manifest.total_size,
            "file uploaded"
        );
        Ok(manifest)
    }

    /// Upload every file of `tree`, reading content from `root_dir` and
    /// indexing each file under its tree path.
    ///
    /// Stops at the first failing file; files uploaded before it stay indexed.
    #[instrument(skip(self, tree), fields(root = %root_dir.display()))]
    pub fn upload_tree(&self, tree: &DirectoryTree, root_dir: &Path) -> TransferResult<UploadSummary> {
        let mut summary = UploadSummary::default();
        for node in tree.walk_files() {
            let local = if node.path.is_empty() {
                root_dir.to_path_buf()
            } else {
                root_dir.join(&node.path)
            };
            let manifest = self.upload_file_as(&local, &node.path)?;
            if manifest.total_size != node.size {
                warn!(
                    path = %node.path,
                    tree_size = node.size,
                    uploaded = manifest.total_size,
                    "file changed since the tree was built"
                );
            }
            summary.files += 1;
            summary.chunks += manifest.chunk_count();
            summary.bytes += manifest.total_size;
        }
        info!(
            files = summary.files,
            chunks = summary.chunks,
            bytes = summary.bytes,
            "tree uploaded"
        );
        Ok(summary)
    }

    /// Reconstruct file `name` into `save_path`.
    ///
    /// Bytes go to a temporary file next to `save_path`, which replaces it
    /// only after every chunk verified. Returns the number of bytes written.
    #[instrument(skip(self), fields(save_path = %save_path.display()))]
    pub fn download_file(&self, name: &str, save_path: &Path) -> TransferResult<u64> {
        let manifest = self.manifest(name)?;

        let dir = match save_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = tempfile::Builder::new()
            .prefix(".chunkfs-download-")
            .tempfile_in(dir)?;

        // Dropping `tmp` on any error path removes the partial file.
        let mut writer = BufWriter::new(tmp);
        let written = self
            .chunker
            .download_to(&manifest, self.store.as_ref(), &mut writer)?;
        let tmp = writer.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(save_path).map_err(|e| TransferError::Io(e.error))?;

        info!(name, written, "file downloaded");
        Ok(written)
    }

    /// Manifest indexed under `name`.
    pub fn manifest(&self, name: &str) -> TransferResult<Arc<FileChunkManifest>> {
        self.index
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| TransferError::NotIndexed {
                name: name.to_string(),
            })
    }

    /// Whether `name` has a manifest.
    pub fn is_indexed(&self, name: &str) -> bool {
        self.index.read().contains_key(name)
    }

    /// All indexed file identities, sorted.
    pub fn indexed_files(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Read `[offset, offset + len)` of file `name`, fetching only the
    /// chunks that overlap the range. Past the end the result is empty.
    pub fn read_range(&self, name: &str, offset: u64, len: u64) -> TransferResult<Bytes> {
        let manifest = self.manifest(name)?;
        manifest.read_with(offset, len, |chunk| self.fetch_chunk(chunk))
    }

    /// Download and verify a single chunk.
    pub fn fetch_chunk(&self, descriptor: &ChunkDescriptor) -> TransferResult<Bytes> {
        debug!(chunk = %descriptor.name, "fetching chunk");
        Chunker::fetch_chunk(descriptor, self.store.as_ref())
    }

    /// Write the file index as indented JSON, atomically.
    pub fn save_index(&self, path: &Path) -> TransferResult<()> {
        let files: BTreeMap<String, FileChunkManifest> = self
            .index
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), FileChunkManifest::clone(v)))
            .collect();
        let count = files.len();
        let doc = IndexFile {
            version: INDEX_FORMAT_VERSION,
            files,
        };
        let mut json = serde_json::to_string_pretty(&doc)?;
        json.push('\n');

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(path).map_err(|e| TransferError::Io(e.error))?;

        info!(path = %path.display(), files = count, "file index saved");
        Ok(())
    }

    /// Merge a saved index into this controller. Every manifest is validated
    /// before any entry is inserted. Returns the number of entries loaded.
    pub fn load_index(&self, path: &Path) -> TransferResult<usize> {
        let json = fs::read_to_string(path)?;
        let doc: IndexFile = serde_json::from_str(&json)?;
        if doc.version != INDEX_FORMAT_VERSION {
            return Err(TransferError::Serialization {
                reason: format!("unsupported index version {}", doc.version),
            });
        }
        for (key, manifest) in &doc.files {
            if &manifest.path != key {
                return Err(TransferError::InvalidManifest {
                    path: key.clone(),
                    reason: format!("indexed under {} but describes {}", key, manifest.path),
                });
            }
            manifest.validate()?;
        }

        let count = doc.files.len();
        let mut index = self.index.write();
        for (key, manifest) in doc.files {
            index.insert(key, Arc::new(manifest));
        }
        info!(path = %path.display(), files = count, "file index loaded");
        Ok(count)
    }
}
