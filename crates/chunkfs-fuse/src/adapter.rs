//! Path-level filesystem operations over a directory tree.
//!
//! The adapter owns the mounted [`DirectoryTree`] behind a read/write lock and
//! a table of open file handles. Tree locks are held only while a node is
//! resolved; content is read through the [`ContentSource`] after the lock is
//! released, so slow chunk fetches never block metadata lookups.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use chunkfs_meta::{join_path, DirectoryTree, NodeKind};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::content::{ContentSource, FileRef};
use crate::error::{FuseError, Result};

/// Permission bits reported for files.
pub const FILE_PERM: u16 = 0o444;
/// Permission bits reported for directories.
pub const DIR_PERM: u16 = 0o555;

/// Attributes of one node as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAttributes {
    pub kind: NodeKind,
    /// Bytes a read will serve; 0 for directories.
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub perm: u16,
}

/// One directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    /// Tree path of the entry.
    pub path: String,
    pub kind: NodeKind,
}

#[derive(Debug)]
struct OpenFile {
    file: FileRef,
}

/// Read-only filesystem state machine over a tree and a content source.
pub struct FilesystemAdapter {
    tree: RwLock<DirectoryTree>,
    content: Arc<dyn ContentSource>,
    handles: DashMap<u64, OpenFile>,
    next_fh: AtomicU64,
}

impl FilesystemAdapter {
    pub fn new(tree: DirectoryTree, content: Arc<dyn ContentSource>) -> Self {
        info!(
            nodes = tree.node_count(),
            content = content.kind(),
            "filesystem adapter ready"
        );
        Self {
            tree: RwLock::new(tree),
            content,
            handles: DashMap::new(),
            next_fh: AtomicU64::new(1),
        }
    }

    /// Swap in a new tree. Open handles keep serving the files they opened.
    pub fn replace_tree(&self, tree: DirectoryTree) {
        let nodes = tree.node_count();
        *self.tree.write() = tree;
        info!(nodes, "tree replaced");
    }

    /// Name of the tree root.
    pub fn root_name(&self) -> String {
        self.tree.read().root().name.clone()
    }

    /// Node and byte totals of the mounted tree.
    pub fn tree_totals(&self) -> (usize, u64) {
        let tree = self.tree.read();
        (tree.node_count(), tree.total_size())
    }

    pub fn content(&self) -> &Arc<dyn ContentSource> {
        &self.content
    }

    /// Attributes of the node at `path`; `""` and `"."` name the root.
    pub fn get_attributes(&self, path: &str) -> Result<NodeAttributes> {
        debug!(path, "getattr");
        let (kind, modified_at, file) = {
            let tree = self.tree.read();
            let node = tree.resolve(path)?;
            let file = (!node.is_dir).then(|| FileRef::from(node));
            (node.kind(), node.modified_at, file)
        };

        Ok(match file {
            Some(file) => NodeAttributes {
                kind,
                size: self.content.content_len(&file),
                modified_at,
                perm: FILE_PERM,
            },
            None => NodeAttributes {
                kind,
                size: 0,
                modified_at,
                perm: DIR_PERM,
            },
        })
    }

    /// Children of the directory at `path`, in tree order.
    pub fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>> {
        debug!(path, "readdir");
        let tree = self.tree.read();
        let dir = tree.resolve_dir(path)?;
        Ok(dir
            .children
            .iter()
            .map(|child| DirEntry {
                name: child.name.clone(),
                path: join_path(&dir.path, &child.name),
                kind: child.kind(),
            })
            .collect())
    }

    /// Open the file at `path` and return its handle id.
    pub fn open_file(&self, path: &str) -> Result<u64> {
        let file = {
            let tree = self.tree.read();
            FileRef::from(tree.resolve_file(path)?)
        };
        self.content.open(&file)?;

        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        debug!(path, fh, "open");
        self.handles.insert(fh, OpenFile { file });
        Ok(fh)
    }

    /// Read up to `len` bytes at `offset` from an open handle. Past the end
    /// of the content the result is empty.
    pub fn read(&self, fh: u64, offset: u64, len: u64) -> Result<Bytes> {
        let file = self
            .handles
            .get(&fh)
            .map(|h| h.file.clone())
            .ok_or(FuseError::BadHandle { fh })?;
        debug!(path = %file.path, fh, offset, len, "read");
        self.content.read(&file, offset, len)
    }

    /// Close a handle.
    pub fn release(&self, fh: u64) -> Result<()> {
        self.handles
            .remove(&fh)
            .map(|_| debug!(fh, "release"))
            .ok_or(FuseError::BadHandle { fh })
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }
}
