//! Directory tree: a root [`FileNode`] plus JSON snapshot persistence.
//!
//! A tree is built once (by scanning or loading a snapshot) and is immutable
//! afterwards. Callers that share it across threads wrap it in a lock; reads
//! need no coordination once it is built.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{MetaError, MetaResult};
use crate::node::{is_root_path, join_path, FileNode};
use crate::pathres;
use crate::scan::{scan_tree, ScanOptions, ScanStats};

/// An in-memory snapshot of a filesystem subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTree {
    root: FileNode,
}

impl DirectoryTree {
    /// Wrap an existing root node. The node is validated.
    pub fn new(root: FileNode) -> MetaResult<Self> {
        let tree = Self { root };
        tree.validate()?;
        Ok(tree)
    }

    /// Scan `root_path` with default options.
    pub fn from_path(root_path: &Path) -> MetaResult<Self> {
        Self::scan(root_path, &ScanOptions::default()).map(|(tree, _)| tree)
    }

    /// Scan `root_path` and return the tree with scan counters.
    pub fn scan(root_path: &Path, options: &ScanOptions) -> MetaResult<(Self, ScanStats)> {
        let (root, stats) = scan_tree(root_path, options)?;
        info!(
            root = %root_path.display(),
            files = stats.files,
            directories = stats.directories,
            skipped = stats.skipped,
            "Built directory tree"
        );
        Ok((Self { root }, stats))
    }

    /// The root node.
    pub fn root(&self) -> &FileNode {
        &self.root
    }

    /// Consume the tree and return its root.
    pub fn into_root(self) -> FileNode {
        self.root
    }

    /// Resolve a root-relative path to a node.
    pub fn resolve(&self, path: &str) -> MetaResult<&FileNode> {
        pathres::resolve(&self.root, path)
    }

    /// Resolve a path that must name a directory.
    pub fn resolve_dir(&self, path: &str) -> MetaResult<&FileNode> {
        pathres::resolve_dir(&self.root, path)
    }

    /// Resolve a path that must name a regular file.
    pub fn resolve_file(&self, path: &str) -> MetaResult<&FileNode> {
        pathres::resolve_file(&self.root, path)
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.root.subtree_len()
    }

    /// Sum of all file sizes.
    pub fn total_size(&self) -> u64 {
        self.walk_files().map(|n| n.size).sum()
    }

    /// Iterate over every regular file in pre-order, children in stored order.
    pub fn walk_files(&self) -> impl Iterator<Item = &FileNode> {
        let mut stack = vec![&self.root];
        std::iter::from_fn(move || {
            while let Some(node) = stack.pop() {
                if node.is_dir {
                    stack.extend(node.children.iter().rev());
                } else {
                    return Some(node);
                }
            }
            None
        })
    }

    /// Check the structural invariants of the tree.
    pub fn validate(&self) -> MetaResult<()> {
        if !is_root_path(&self.root.path) {
            return Err(MetaError::InvalidTree {
                path: self.root.path.clone(),
                reason: "root path must be empty or \".\"".to_string(),
            });
        }

        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            if !node.is_dir {
                if !node.children.is_empty() {
                    return Err(invalid(node, "file has children"));
                }
                continue;
            }
            if node.size != 0 {
                return Err(invalid(node, "directory has non-zero size"));
            }

            let mut seen = HashSet::with_capacity(node.children.len());
            for child in &node.children {
                if child.name.is_empty() || child.name.contains('/') || child.name == "." || child.name == ".." {
                    return Err(invalid(child, "name is not a single path segment"));
                }
                if !seen.insert(child.name.as_str()) {
                    return Err(invalid(child, "duplicate child name"));
                }
                if child.path != join_path(&node.path, &child.name) {
                    return Err(invalid(child, "path does not match parent path and name"));
                }
                stack.push(child);
            }
        }
        Ok(())
    }

    /// Encode as indented JSON.
    pub fn to_json_string(&self) -> MetaResult<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    /// Decode and validate a tree from JSON.
    ///
    /// Nesting depth is unbounded: the recursion limit is lifted and the
    /// stack grows on demand, so any tree that saves also loads.
    pub fn from_json_str(json: &str) -> MetaResult<Self> {
        let mut de = serde_json::Deserializer::from_str(json);
        de.disable_recursion_limit();
        let root = FileNode::deserialize(serde_stacker::Deserializer::new(&mut de))?;
        de.end()?;
        Self::new(root)
    }

    /// Write the tree as an indented JSON snapshot.
    ///
    /// The snapshot is written to a temporary file next to `output_path`
    /// and renamed into place, so readers never observe a partial file.
    pub fn save_to_json(&self, output_path: &Path) -> MetaResult<()> {
        let json = self.to_json_string()?;
        let dir = match output_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(output_path).map_err(|e| MetaError::Io(e.error))?;

        info!(path = %output_path.display(), nodes = self.node_count(), "Directory tree saved");
        Ok(())
    }

    /// Read a JSON snapshot written by [`DirectoryTree::save_to_json`].
    pub fn load_from_json(path: &Path) -> MetaResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let tree = Self::from_json_str(&json)?;
        info!(path = %path.display(), nodes = tree.node_count(), "Directory tree loaded");
        Ok(tree)
    }
}

fn invalid(node: &FileNode, reason: &str) -> MetaError {
    MetaError::InvalidTree {
        path: node.path.clone(),
        reason: reason.to_string(),
    }
}
