#![warn(missing_docs)]

//! ChunkFS FUSE subsystem: the path-level filesystem adapter, content
//! sources, the `fuser` bridge, mount handling, config and CLI.

pub mod adapter;
pub mod attr;
pub mod cli;
pub mod config;
pub mod content;
pub mod datacache;
pub mod error;
pub mod filesystem;
pub mod inode;
pub mod mount;

pub use adapter::{DirEntry, FilesystemAdapter, NodeAttributes, DIR_PERM, FILE_PERM};
pub use config::ChunkFsConfig;
pub use content::{ChunkContent, ContentSource, FileRef, PlaceholderContent};
pub use datacache::{ChunkCache, ChunkCacheConfig, ChunkCacheStats};
pub use error::{FuseError, Result};
pub use filesystem::{ChunkFs, ChunkFsOptions};
pub use mount::{parse_mount_options, validate_mountpoint, MountError, MountOptions};
