use std::collections::HashMap;

use crate::error::{FuseError, Result};

pub type InodeId = u64;
pub const ROOT_INODE: InodeId = 1;

/// Maps kernel inode numbers to tree paths.
///
/// Inodes are assigned on first sight of a path and stay stable while the
/// kernel holds a lookup reference. The root is never forgotten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeEntry {
    pub ino: InodeId,
    pub path: String,
    pub lookup_count: u64,
}

pub struct InodeTable {
    entries: HashMap<InodeId, InodeEntry>,
    by_path: HashMap<String, InodeId>,
    next_ino: InodeId,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = InodeTable {
            entries: HashMap::new(),
            by_path: HashMap::new(),
            next_ino: ROOT_INODE + 1,
        };
        table.entries.insert(
            ROOT_INODE,
            InodeEntry {
                ino: ROOT_INODE,
                path: String::new(),
                lookup_count: 1,
            },
        );
        table.by_path.insert(String::new(), ROOT_INODE);
        table
    }

    /// Inode for `path`, allocating one if needed. Does not take a lookup
    /// reference; readdir uses this.
    pub fn assign(&mut self, path: &str) -> InodeId {
        if let Some(&ino) = self.by_path.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.entries.insert(
            ino,
            InodeEntry {
                ino,
                path: path.to_string(),
                lookup_count: 0,
            },
        );
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    /// Inode for `path` with one more lookup reference, as for a successful
    /// `lookup` reply.
    pub fn lookup(&mut self, path: &str) -> InodeId {
        let ino = self.assign(path);
        if let Some(entry) = self.entries.get_mut(&ino) {
            entry.lookup_count += 1;
        }
        ino
    }

    pub fn get(&self, ino: InodeId) -> Option<&InodeEntry> {
        self.entries.get(&ino)
    }

    /// Tree path of `ino`.
    pub fn path(&self, ino: InodeId) -> Result<String> {
        self.entries
            .get(&ino)
            .map(|e| e.path.clone())
            .ok_or(FuseError::InodeNotFound { ino })
    }

    /// Drop `n` lookup references; the entry goes away at zero.
    pub fn forget(&mut self, ino: InodeId, n: u64) {
        if ino == ROOT_INODE {
            return;
        }
        let should_remove = match self.entries.get_mut(&ino) {
            Some(entry) => {
                entry.lookup_count = entry.lookup_count.saturating_sub(n);
                entry.lookup_count == 0
            }
            None => false,
        };
        if should_remove {
            if let Some(entry) = self.entries.remove(&ino) {
                self.by_path.remove(&entry.path);
            }
        }
    }

    /// Forget every inode except the root, e.g. after the tree is replaced.
    pub fn clear(&mut self) {
        self.entries.retain(|&ino, _| ino == ROOT_INODE);
        self.by_path.retain(|_, &mut ino| ino == ROOT_INODE);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Parent path of a tree path; the root is its own parent.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_present() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INODE).unwrap(), "");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_assign_is_stable() {
        let mut table = InodeTable::new();
        let a = table.assign("a.txt");
        let b = table.assign("b");
        assert_ne!(a, b);
        assert_eq!(table.assign("a.txt"), a);
        assert_eq!(table.path(b).unwrap(), "b");
        assert_eq!(table.assign(""), ROOT_INODE);
    }

    #[test]
    fn test_lookup_counts_and_forget() {
        let mut table = InodeTable::new();
        let ino = table.lookup("b/c.txt");
        table.lookup("b/c.txt");
        assert_eq!(table.get(ino).unwrap().lookup_count, 2);
        table.forget(ino, 1);
        assert!(table.get(ino).is_some());
        table.forget(ino, 1);
        assert!(table.get(ino).is_none());
        assert!(matches!(table.path(ino), Err(FuseError::InodeNotFound { .. })));
        // A fresh lookup allocates a new inode.
        assert_ne!(table.lookup("b/c.txt"), ino);
    }

    #[test]
    fn test_root_never_forgotten() {
        let mut table = InodeTable::new();
        table.forget(ROOT_INODE, 100);
        assert!(table.get(ROOT_INODE).is_some());
    }

    #[test]
    fn test_clear_keeps_root() {
        let mut table = InodeTable::new();
        table.lookup("a");
        table.assign("b");
        table.clear();
        assert_eq!(table.len(), 1);
        assert_eq!(table.assign(""), ROOT_INODE);
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("a.txt"), "");
        assert_eq!(parent_path("b/c.txt"), "b");
        assert_eq!(parent_path("x/y/z"), "x/y");
        assert_eq!(parent_path(""), "");
    }
}
