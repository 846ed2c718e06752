//! Recursive scan of a live filesystem into a [`FileNode`] tree.
//!
//! Errors reading any entry below the root are logged and that entry is
//! skipped; only a failure on the root itself aborts the scan.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::MetaResult;
use crate::node::{join_path, FileNode};

/// Options controlling a filesystem scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Follow symbolic links. When false, links are skipped.
    pub follow_symlinks: bool,
    /// Do not list the contents of directories deeper than this.
    /// The root is depth 0.
    pub max_depth: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: true,
            max_depth: None,
        }
    }
}

/// Counters collected during a scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    /// Regular files recorded.
    pub files: u64,
    /// Directories recorded, including the root.
    pub directories: u64,
    /// Entries skipped because they could not be read.
    pub skipped: u64,
    /// Sum of recorded file sizes.
    pub total_bytes: u64,
}

struct Scanner<'a> {
    options: &'a ScanOptions,
    stats: ScanStats,
    ancestors: HashSet<PathBuf>,
}

/// Scan `root` and build its tree. The root node has path `""`.
pub fn scan_tree(root: &Path, options: &ScanOptions) -> MetaResult<(FileNode, ScanStats)> {
    let metadata = fs::metadata(root)?;
    let name = root_name(root);
    let mut scanner = Scanner {
        options,
        stats: ScanStats::default(),
        ancestors: HashSet::new(),
    };

    let node = if metadata.is_dir() {
        let mut node = FileNode::new_dir(name, "", modified_at(&metadata));
        scanner.stats.directories += 1;
        if scanner.descends(0) {
            scanner.ancestors.insert(fs::canonicalize(root)?);
            node.children = scanner.read_children(root, "", 0)?;
        }
        node
    } else {
        scanner.stats.files += 1;
        scanner.stats.total_bytes += metadata.len();
        FileNode::new_file(name, "", metadata.len(), modified_at(&metadata))
    };

    debug!(
        root = %root.display(),
        files = scanner.stats.files,
        directories = scanner.stats.directories,
        skipped = scanner.stats.skipped,
        "scan complete"
    );
    Ok((node, scanner.stats))
}

impl Scanner<'_> {
    fn descends(&self, depth: usize) -> bool {
        self.options.max_depth.map_or(true, |max| depth < max)
    }

    fn read_children(
        &mut self,
        dir: &Path,
        parent_path: &str,
        depth: usize,
    ) -> std::io::Result<Vec<FileNode>> {
        let mut names: Vec<OsString> = Vec::new();
        for entry in fs::read_dir(dir)? {
            match entry {
                Ok(entry) => names.push(entry.file_name()),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "failed to read directory entry, skipping");
                    self.stats.skipped += 1;
                }
            }
        }
        names.sort();

        let mut children = Vec::with_capacity(names.len());
        for os_name in names {
            let child_fs_path = dir.join(&os_name);
            let Some(name) = os_name.to_str() else {
                warn!(path = %child_fs_path.display(), "non UTF-8 file name, skipping");
                self.stats.skipped += 1;
                continue;
            };
            let child_path = join_path(parent_path, name);
            match self.build_node(&child_fs_path, name, &child_path, depth + 1) {
                Ok(Some(node)) => children.push(node),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %child_fs_path.display(), error = %e, "failed to read entry, skipping");
                    self.stats.skipped += 1;
                }
            }
        }
        Ok(children)
    }

    fn build_node(
        &mut self,
        fs_path: &Path,
        name: &str,
        tree_path: &str,
        depth: usize,
    ) -> std::io::Result<Option<FileNode>> {
        let link_metadata = fs::symlink_metadata(fs_path)?;
        let metadata = if link_metadata.file_type().is_symlink() {
            if !self.options.follow_symlinks {
                debug!(path = %fs_path.display(), "skipping symlink");
                self.stats.skipped += 1;
                return Ok(None);
            }
            fs::metadata(fs_path)?
        } else {
            link_metadata
        };

        if !metadata.is_dir() {
            self.stats.files += 1;
            self.stats.total_bytes += metadata.len();
            return Ok(Some(FileNode::new_file(
                name,
                tree_path,
                metadata.len(),
                modified_at(&metadata),
            )));
        }

        let mut node = FileNode::new_dir(name, tree_path, modified_at(&metadata));
        if self.descends(depth) {
            let canonical = fs::canonicalize(fs_path)?;
            if !self.ancestors.insert(canonical.clone()) {
                warn!(path = %fs_path.display(), "directory cycle through symlink, skipping");
                self.stats.skipped += 1;
                return Ok(None);
            }
            let children = self.read_children(fs_path, tree_path, depth);
            self.ancestors.remove(&canonical);
            node.children = children?;
        }
        self.stats.directories += 1;
        Ok(Some(node))
    }
}

fn root_name(root: &Path) -> String {
    let named = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    match named {
        Some(name) => name,
        None => fs::canonicalize(root)
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default(),
    }
}

fn modified_at(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}
