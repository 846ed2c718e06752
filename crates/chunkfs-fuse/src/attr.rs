use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use chunkfs_meta::NodeKind;

use crate::adapter::NodeAttributes;

pub const BLOCK_SIZE: u32 = 4096;

pub fn node_kind_to_fuser_type(kind: NodeKind) -> fuser::FileType {
    match kind {
        NodeKind::File => fuser::FileType::RegularFile,
        NodeKind::Directory => fuser::FileType::Directory,
    }
}

pub fn blocks_for_size(size: u64) -> u64 {
    size.div_ceil(512)
}

/// Timestamp for the kernel; unknown or pre-epoch times map to the epoch.
pub fn to_system_time(t: Option<DateTime<Utc>>) -> SystemTime {
    match t {
        Some(t) => {
            let secs = t.timestamp();
            if secs < 0 {
                SystemTime::UNIX_EPOCH
            } else {
                SystemTime::UNIX_EPOCH + Duration::new(secs as u64, t.timestamp_subsec_nanos())
            }
        }
        None => SystemTime::UNIX_EPOCH,
    }
}

/// Kernel attributes for a node owned by `uid`/`gid`.
pub fn to_fuser_attr(ino: u64, attrs: &NodeAttributes, uid: u32, gid: u32) -> fuser::FileAttr {
    let mtime = to_system_time(attrs.modified_at);
    let (size, nlink) = match attrs.kind {
        NodeKind::File => (attrs.size, 1),
        NodeKind::Directory => (BLOCK_SIZE as u64, 2),
    };
    fuser::FileAttr {
        ino,
        size,
        blocks: blocks_for_size(size),
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: SystemTime::UNIX_EPOCH,
        kind: node_kind_to_fuser_type(attrs.kind),
        perm: attrs.perm,
        nlink,
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DIR_PERM, FILE_PERM};
    use chrono::TimeZone;

    #[test]
    fn test_file_attr() {
        let attrs = NodeAttributes {
            kind: NodeKind::File,
            size: 1000,
            modified_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            perm: FILE_PERM,
        };
        let fa = to_fuser_attr(7, &attrs, 1000, 100);
        assert_eq!(fa.ino, 7);
        assert_eq!(fa.kind, fuser::FileType::RegularFile);
        assert_eq!(fa.size, 1000);
        assert_eq!(fa.blocks, 2);
        assert_eq!(fa.perm, 0o444);
        assert_eq!(fa.nlink, 1);
        assert_eq!((fa.uid, fa.gid), (1000, 100));
        assert_eq!(
            fa.mtime.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs(),
            1_704_164_645
        );
    }

    #[test]
    fn test_dir_attr() {
        let attrs = NodeAttributes {
            kind: NodeKind::Directory,
            size: 0,
            modified_at: None,
            perm: DIR_PERM,
        };
        let fa = to_fuser_attr(1, &attrs, 0, 0);
        assert_eq!(fa.kind, fuser::FileType::Directory);
        assert_eq!(fa.nlink, 2);
        assert_eq!(fa.perm, 0o555);
        assert_eq!(fa.mtime, SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn test_pre_epoch_clamped() {
        let t = Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(to_system_time(Some(t)), SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn test_blocks_for_size() {
        assert_eq!(blocks_for_size(0), 0);
        assert_eq!(blocks_for_size(1), 1);
        assert_eq!(blocks_for_size(512), 1);
        assert_eq!(blocks_for_size(513), 2);
    }
}
