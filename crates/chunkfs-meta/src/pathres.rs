//! Path resolution against an in-memory tree.
//!
//! Resolution walks from the root one segment at a time, matching child
//! names exactly. Any unmatched segment fails the whole lookup.

use crate::error::{MetaError, MetaResult};
use crate::node::FileNode;

/// Longest path, in segments, that resolution will walk.
pub const MAX_PATH_DEPTH: usize = 4096;

/// Split a path into its segments. Handles leading, trailing and repeated
/// slashes, and drops `.` segments. `""`, `"."` and `"/"` yield no segments.
pub fn parse_path(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

/// Resolve `path` to a node under `root`.
pub fn resolve<'a>(root: &'a FileNode, path: &str) -> MetaResult<&'a FileNode> {
    let segments = parse_path(path);
    if segments.len() > MAX_PATH_DEPTH {
        return Err(MetaError::NotFound {
            path: path.to_string(),
        });
    }

    let mut current = root;
    for segment in segments {
        if !current.is_dir {
            return Err(MetaError::NotFound {
                path: path.to_string(),
            });
        }
        current = current.child(segment).ok_or_else(|| MetaError::NotFound {
            path: path.to_string(),
        })?;
    }
    Ok(current)
}

/// Resolve `path` and require it to be a directory.
pub fn resolve_dir<'a>(root: &'a FileNode, path: &str) -> MetaResult<&'a FileNode> {
    let node = resolve(root, path)?;
    if !node.is_dir {
        return Err(MetaError::NotADirectory {
            path: path.to_string(),
        });
    }
    Ok(node)
}

/// Resolve `path` and require it to be a regular file.
pub fn resolve_file<'a>(root: &'a FileNode, path: &str) -> MetaResult<&'a FileNode> {
    let node = resolve(root, path)?;
    if node.is_dir {
        return Err(MetaError::IsADirectory {
            path: path.to_string(),
        });
    }
    Ok(node)
}
