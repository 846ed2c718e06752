//! `fuser::Filesystem` bridge over the [`FilesystemAdapter`].
//!
//! Translates inode-based kernel callbacks into path-based adapter calls.
//! Every write-side callback is rejected with EROFS.

use std::ffi::OsStr;
use std::os::raw::c_int;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use chunkfs_meta::{join_path, DirectoryTree, NodeKind};
use fuser::{
    FileType as FuserFileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::adapter::FilesystemAdapter;
use crate::attr::{node_kind_to_fuser_type, to_fuser_attr, BLOCK_SIZE};
use crate::error::{FuseError, Result};
use crate::inode::{parent_path, InodeId, InodeTable, ROOT_INODE};

const MAX_NAME_LEN: u32 = 255;

#[derive(Debug, Clone)]
pub struct ChunkFsOptions {
    pub attr_timeout: Duration,
    pub entry_timeout: Duration,
    /// Owner reported for every node.
    pub uid: u32,
    pub gid: u32,
    /// Reply FOPEN_KEEP_CACHE on open. Snapshot content never changes
    /// under an open handle.
    pub keep_cache: bool,
}

impl Default for ChunkFsOptions {
    fn default() -> Self {
        Self {
            attr_timeout: Duration::from_secs(1),
            entry_timeout: Duration::from_secs(1),
            uid: 0,
            gid: 0,
            keep_cache: true,
        }
    }
}

impl ChunkFsOptions {
    /// Defaults owned by the calling process, with the given attribute TTL.
    pub fn for_current_user(ttl: Duration) -> Self {
        // SAFETY: getuid/getgid cannot fail and touch no memory.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            attr_timeout: ttl,
            entry_timeout: ttl,
            uid,
            gid,
            keep_cache: true,
        }
    }
}

/// One `readdir` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub ino: InodeId,
    pub kind: FuserFileType,
    pub name: String,
}

pub struct ChunkFs {
    options: ChunkFsOptions,
    adapter: Arc<FilesystemAdapter>,
    inodes: Mutex<InodeTable>,
}

impl ChunkFs {
    pub fn new(adapter: Arc<FilesystemAdapter>, options: ChunkFsOptions) -> Self {
        Self {
            options,
            adapter,
            inodes: Mutex::new(InodeTable::new()),
        }
    }

    pub fn options(&self) -> &ChunkFsOptions {
        &self.options
    }

    pub fn adapter(&self) -> &Arc<FilesystemAdapter> {
        &self.adapter
    }

    /// Replace the tree and drop every inode except the root.
    pub fn replace_tree(&self, tree: DirectoryTree) {
        self.adapter.replace_tree(tree);
        self.inodes.lock().clear();
    }

    fn path_of(&self, ino: InodeId) -> Result<String> {
        self.inodes.lock().path(ino)
    }

    fn attr_for(&self, ino: InodeId, path: &str) -> Result<fuser::FileAttr> {
        let attrs = self.adapter.get_attributes(path)?;
        Ok(to_fuser_attr(ino, &attrs, self.options.uid, self.options.gid))
    }

    pub fn lookup_entry(&self, parent: InodeId, name: &OsStr) -> Result<fuser::FileAttr> {
        let parent_dir = self.path_of(parent)?;
        let name = name.to_str().ok_or_else(|| FuseError::NotFound {
            path: join_path(&parent_dir, &name.to_string_lossy()),
        })?;
        let path = join_path(&parent_dir, name);
        // Resolve first so failed lookups never allocate an inode.
        let attrs = self.adapter.get_attributes(&path)?;
        let ino = self.inodes.lock().lookup(&path);
        Ok(to_fuser_attr(ino, &attrs, self.options.uid, self.options.gid))
    }

    pub fn attr(&self, ino: InodeId) -> Result<fuser::FileAttr> {
        let path = self.path_of(ino)?;
        self.attr_for(ino, &path)
    }

    /// Entries of a directory including `.` and `..`.
    pub fn dir_listing(&self, ino: InodeId) -> Result<Vec<DirListing>> {
        let path = self.path_of(ino)?;
        let children = self.adapter.list_directory(&path)?;

        let mut inodes = self.inodes.lock();
        let parent_ino = if ino == ROOT_INODE {
            ROOT_INODE
        } else {
            inodes.assign(parent_path(&path))
        };
        let mut out = Vec::with_capacity(children.len() + 2);
        out.push(DirListing {
            ino,
            kind: FuserFileType::Directory,
            name: ".".to_string(),
        });
        out.push(DirListing {
            ino: parent_ino,
            kind: FuserFileType::Directory,
            name: "..".to_string(),
        });
        for child in children {
            out.push(DirListing {
                ino: inodes.assign(&child.path),
                kind: node_kind_to_fuser_type(child.kind),
                name: child.name,
            });
        }
        Ok(out)
    }

    pub fn open_inode(&self, ino: InodeId, flags: i32) -> Result<u64> {
        if flags & libc::O_ACCMODE != libc::O_RDONLY || flags & libc::O_TRUNC != 0 {
            return Err(FuseError::ReadOnly {
                op: "open for writing".to_string(),
            });
        }
        let path = self.path_of(ino)?;
        self.adapter.open_file(&path)
    }

    pub fn read_handle(&self, fh: u64, offset: i64, size: u32) -> Result<Bytes> {
        let offset = u64::try_from(offset).map_err(|_| FuseError::InvalidArgument {
            msg: format!("negative read offset {}", offset),
        })?;
        self.adapter.read(fh, offset, size as u64)
    }

    pub fn check_access(&self, ino: InodeId, mask: i32) -> Result<()> {
        let path = self.path_of(ino)?;
        let attrs = self.adapter.get_attributes(&path)?;
        if mask & libc::W_OK != 0 {
            return Err(FuseError::ReadOnly {
                op: "write access".to_string(),
            });
        }
        if mask & libc::X_OK != 0 && attrs.kind == NodeKind::File {
            return Err(FuseError::InvalidArgument {
                msg: "files are not executable".to_string(),
            });
        }
        Ok(())
    }

    fn open_flags(&self) -> u32 {
        if self.options.keep_cache {
            fuser::consts::FOPEN_KEEP_CACHE
        } else {
            0
        }
    }

    fn read_only(op: &str) -> c_int {
        debug!(op, "rejected on read-only mount");
        FuseError::ReadOnly { op: op.to_string() }.to_errno()
    }
}

impl Filesystem for ChunkFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> std::result::Result<(), c_int> {
        let (nodes, bytes) = self.adapter.tree_totals();
        info!(nodes, bytes, "chunkfs mounted");
        Ok(())
    }

    fn destroy(&mut self) {
        info!("chunkfs unmounted");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!(parent, name = %name.to_string_lossy(), "lookup");
        match self.lookup_entry(parent, name) {
            Ok(attr) => reply.entry(&self.options.entry_timeout, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        debug!(ino, nlookup, "forget");
        self.inodes.lock().forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.attr(ino) {
            Ok(attr) => reply.attr(&self.options.attr_timeout, &attr),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        reply.error(Self::read_only("setattr"));
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(Self::read_only("mkdir"));
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(Self::read_only("unlink"));
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(Self::read_only("rmdir"));
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(Self::read_only("rename"));
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.open_inode(ino, flags) {
            Ok(fh) => reply.opened(fh, self.open_flags()),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.read_handle(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(Self::read_only("write"));
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.adapter.release(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.adapter.list_directory(&path).map(|_| ()));
        match result {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!(ino, offset, "readdir");
        let entries = match self.dir_listing(ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, entry) in entries.iter().enumerate().skip(skip) {
            if reply.add(entry.ino, (i + 1) as i64, entry.kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let (nodes, bytes) = self.adapter.tree_totals();
        let blocks = bytes.div_ceil(BLOCK_SIZE as u64);
        reply.statfs(
            blocks,
            0,
            0,
            nodes as u64,
            0,
            BLOCK_SIZE,
            MAX_NAME_LEN,
            BLOCK_SIZE,
        );
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        match self.check_access(ino, mask) {
            Ok(()) => reply.ok(),
            Err(FuseError::InvalidArgument { .. }) => reply.error(libc::EACCES),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(Self::read_only("create"));
    }
}
