//! Filesystem node model and its snapshot encoding.
//!
//! A [`FileNode`] is one entry of a scanned directory tree. The serde layout
//! is the snapshot format: keys `name`, `path`, `isDir`, `size`, `modTime`,
//! `children`, with `size`, `modTime` and `children` omitted when empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator between path segments inside a tree.
pub const PATH_SEPARATOR: char = '/';

/// One file or directory entry of a [`crate::DirectoryTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Single path segment.
    pub name: String,
    /// Root-relative, slash-separated path. Empty for the root.
    pub path: String,
    /// True for directories.
    #[serde(rename = "isDir", default)]
    pub is_dir: bool,
    /// Size in bytes. Always 0 for directories.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,
    /// Last modification time, if known.
    #[serde(rename = "modTime", default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    /// Ordered children. Always empty for files.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Kind of a node, as seen by filesystem callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileNode {
    /// Create a file node.
    pub fn new_file(
        name: impl Into<String>,
        path: impl Into<String>,
        size: u64,
        modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_dir: false,
            size,
            modified_at,
            children: Vec::new(),
        }
    }

    /// Create an empty directory node.
    pub fn new_dir(
        name: impl Into<String>,
        path: impl Into<String>,
        modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_dir: true,
            size: 0,
            modified_at,
            children: Vec::new(),
        }
    }

    /// Node kind.
    pub fn kind(&self) -> NodeKind {
        if self.is_dir {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }

    /// True when this node is a tree root.
    pub fn is_root(&self) -> bool {
        is_root_path(&self.path)
    }

    /// Find a direct child by exact (case-sensitive) name.
    pub fn child(&self, name: &str) -> Option<&FileNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

/// True for the root path spellings `""` and `"."`.
pub fn is_root_path(path: &str) -> bool {
    path.is_empty() || path == "."
}

/// Build a child path from its parent path and name.
pub fn join_path(parent: &str, name: &str) -> String {
    if is_root_path(parent) {
        name.to_string()
    } else {
        format!("{}{}{}", parent, PATH_SEPARATOR, name)
    }
}
