//! Mount point management for the ChunkFS FUSE client.
//!
//! Parses mount options, validates the mount point and hands a [`ChunkFs`]
//! to fuser. The mount is always read-only.

use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::filesystem::ChunkFs;

/// Default option string for mounts.
pub const DEFAULT_MOUNT_OPTIONS: &str = "ro,auto_unmount";

/// Mount options for FUSE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Allow other users to access.
    pub allow_other: bool,
    /// Allow root to access.
    pub allow_root: bool,
    /// Let the kernel check permission bits.
    pub default_permissions: bool,
    /// Auto unmount on exit.
    pub auto_unmount: bool,
    /// Keep file data in the kernel page cache across opens. Applied per
    /// open through `ChunkFsOptions::keep_cache`, not as a mount option.
    pub kernel_cache: bool,
    /// Filesystem name shown in the mount table.
    pub fsname: String,
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions {
            allow_other: false,
            allow_root: false,
            default_permissions: false,
            auto_unmount: true,
            kernel_cache: true,
            fsname: "chunkfs".to_string(),
        }
    }
}

/// Errors that can occur during mount operations.
#[derive(Debug, Error)]
pub enum MountError {
    /// Path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// Path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Permission denied.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid option.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// The kernel mount itself failed.
    #[error("Mount failed at {mountpoint}: {reason}")]
    MountFailed {
        /// Target mount point.
        mountpoint: String,
        /// Error reported by fuser.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for MountError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                MountError::PermissionDenied(format!("permission denied: {}", e))
            }
            _ => MountError::IoError(e.to_string()),
        }
    }
}

/// Validate a mountpoint path.
pub fn validate_mountpoint(path: &Path) -> Result<(), MountError> {
    if !path.exists() {
        return Err(MountError::PathNotFound(path.display().to_string()));
    }

    if !path.is_dir() {
        return Err(MountError::NotADirectory(path.display().to_string()));
    }

    Ok(())
}

/// Parse mount options from a comma-separated string.
///
/// Valid options: allow_other, allow_root, default_permissions, auto_unmount,
/// kernel_cache, no_kernel_cache, fsname=<name>, ro. `rw` is rejected.
pub fn parse_mount_options(opts_str: &str) -> Result<MountOptions, MountError> {
    let mut options = MountOptions::default();

    for opt in opts_str.split(',') {
        let opt = opt.trim();
        match opt {
            "allow_other" => options.allow_other = true,
            "allow_root" => options.allow_root = true,
            "default_permissions" => options.default_permissions = true,
            "auto_unmount" => options.auto_unmount = true,
            "kernel_cache" => options.kernel_cache = true,
            "no_kernel_cache" => options.kernel_cache = false,
            "ro" | "" => {}
            "rw" => {
                return Err(MountError::InvalidOption(
                    "rw (chunkfs mounts are read-only)".to_string(),
                ))
            }
            _ => match opt.strip_prefix("fsname=") {
                Some(name) if !name.is_empty() => options.fsname = name.to_string(),
                _ => return Err(MountError::InvalidOption(opt.to_string())),
            },
        }
    }

    if options.allow_other && options.allow_root {
        return Err(MountError::InvalidOption(
            "allow_other and allow_root are mutually exclusive".to_string(),
        ));
    }

    Ok(options)
}

/// Convert MountOptions to fuser::MountOption vec. Always includes `RO`.
pub fn options_to_fuser(opts: &MountOptions) -> Vec<fuser::MountOption> {
    let mut fuser_opts = vec![
        fuser::MountOption::RO,
        fuser::MountOption::FSName(opts.fsname.clone()),
        fuser::MountOption::Subtype("chunkfs".to_string()),
    ];

    if opts.allow_other {
        fuser_opts.push(fuser::MountOption::AllowOther);
    }

    if opts.allow_root {
        fuser_opts.push(fuser::MountOption::AllowRoot);
    }

    if opts.default_permissions {
        fuser_opts.push(fuser::MountOption::DefaultPermissions);
    }

    if opts.auto_unmount {
        fuser_opts.push(fuser::MountOption::AutoUnmount);
    }

    fuser_opts
}

/// Mount `fs` at `mountpoint` and serve requests until it is unmounted.
pub fn mount(fs: ChunkFs, mountpoint: &Path, opts: &MountOptions) -> Result<(), MountError> {
    validate_mountpoint(mountpoint)?;
    info!(mountpoint = %mountpoint.display(), ?opts, "mounting");
    fuser::mount2(fs, mountpoint, &options_to_fuser(opts)).map_err(|e| MountError::MountFailed {
        mountpoint: mountpoint.display().to_string(),
        reason: e.to_string(),
    })
}

/// Mount `fs` on a background thread. Dropping the session unmounts.
pub fn spawn_mount(
    fs: ChunkFs,
    mountpoint: &Path,
    opts: &MountOptions,
) -> Result<fuser::BackgroundSession, MountError> {
    validate_mountpoint(mountpoint)?;
    info!(mountpoint = %mountpoint.display(), ?opts, "mounting in background");
    fuser::spawn_mount2(fs, mountpoint, &options_to_fuser(opts)).map_err(|e| {
        MountError::MountFailed {
            mountpoint: mountpoint.display().to_string(),
            reason: e.to_string(),
        }
    })
}
