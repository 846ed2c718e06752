use crate::adapter::FilesystemAdapter;
use crate::config::ChunkFsConfig;
use crate::content::{ChunkContent, ContentSource, PlaceholderContent};
use crate::filesystem::{ChunkFs, ChunkFsOptions};
use crate::mount::{mount, parse_mount_options};
use anyhow::{Context, Result};
use chunkfs_meta::{DirectoryTree, ScanOptions};
use chunkfs_storage::LocalDirChunkStore;
use chunkfs_transfer::FileController;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "chunkfs")]
#[command(about = "Chunked remote store exposed as a read-only filesystem", long_about = None)]
pub struct Cli {
    /// TOML or JSON config file
    #[arg(short, long, global = true, env = "CHUNKFS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Store and index locations, overriding the config file.
#[derive(Args, Clone, Debug, Default)]
pub struct StoreArgs {
    /// Chunk store directory
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// File chunk index (JSON)
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// Largest chunk in bytes
    #[arg(long)]
    pub max_chunk_size: Option<usize>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan a directory and save its tree snapshot
    Scan {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        snapshot: PathBuf,
        /// Do not descend into symlinked directories
        #[arg(long)]
        no_follow_symlinks: bool,
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Upload one file into the chunk store
    Upload {
        #[arg(long)]
        file: PathBuf,
        /// Index key; defaults to the file path as given
        #[arg(long)]
        key: Option<String>,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Scan a directory, save its snapshot and upload every file
    UploadTree {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        snapshot: PathBuf,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Reassemble an uploaded file
    Download {
        #[arg(long)]
        name: String,
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Mount a tree snapshot read-only
    Mount {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        mountpoint: PathBuf,
        /// Serve placeholder text instead of chunk data
        #[arg(long)]
        placeholder: bool,
        /// Comma-separated mount options
        #[arg(long)]
        options: Option<String>,
        #[command(flatten)]
        store: StoreArgs,
    },
}

impl StoreArgs {
    fn apply(&self, mut config: ChunkFsConfig) -> ChunkFsConfig {
        if let Some(ref store) = self.store {
            config.store_dir = store.clone();
        }
        if let Some(ref index) = self.index {
            config.index_path = index.clone();
        }
        if let Some(size) = self.max_chunk_size {
            config.max_chunk_size = size;
        }
        config
    }
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config = ChunkFsConfig::load(self.config.as_deref())
            .with_context(|| format!("loading config {:?}", self.config))?;

        match self.command {
            Command::Scan {
                ref root,
                ref snapshot,
                no_follow_symlinks,
                max_depth,
            } => {
                let options = ScanOptions {
                    follow_symlinks: !no_follow_symlinks,
                    max_depth,
                };
                scan(root, snapshot, &options)
            }
            Command::Upload {
                ref file,
                ref key,
                ref store,
            } => upload(&store.apply(config), file, key.as_deref()),
            Command::UploadTree {
                ref root,
                ref snapshot,
                ref store,
            } => upload_tree(&store.apply(config), root, snapshot),
            Command::Download {
                ref name,
                ref out,
                ref store,
            } => download(&store.apply(config), name, out),
            Command::Mount {
                ref snapshot,
                ref mountpoint,
                placeholder,
                ref options,
                ref store,
            } => {
                let mut config = store.apply(config);
                if let Some(opts) = options {
                    config.mount_options = opts.clone();
                }
                mount_snapshot(&config, snapshot, mountpoint, placeholder)
            }
        }
    }
}

/// Controller over the configured local store, with the saved index merged in
/// when it exists.
pub fn open_controller(config: &ChunkFsConfig) -> Result<FileController> {
    let store = LocalDirChunkStore::open(&config.store_dir)
        .with_context(|| format!("opening chunk store {}", config.store_dir.display()))?;
    let controller = FileController::new(config.chunker(), Arc::new(store))?;
    if config.index_path.exists() {
        controller
            .load_index(&config.index_path)
            .with_context(|| format!("loading index {}", config.index_path.display()))?;
    }
    Ok(controller)
}

fn scan(root: &Path, snapshot: &Path, options: &ScanOptions) -> Result<()> {
    let (tree, stats) = DirectoryTree::scan(root, options)
        .with_context(|| format!("scanning {}", root.display()))?;
    tree.save_to_json(snapshot)?;
    println!(
        "Scanned {}: {} files, {} directories, {} bytes ({} skipped)",
        root.display(),
        stats.files,
        stats.directories,
        stats.total_bytes,
        stats.skipped
    );
    println!("Snapshot written to {}", snapshot.display());
    Ok(())
}

fn upload(config: &ChunkFsConfig, file: &Path, key: Option<&str>) -> Result<()> {
    let controller = open_controller(config)?;
    let manifest = match key {
        Some(k) => controller.upload_file_as(file, k)?,
        None => controller.upload_file(file)?,
    };
    controller.save_index(&config.index_path)?;
    println!(
        "Uploaded {} as {:?}: {} bytes in {} chunks",
        file.display(),
        manifest.path,
        manifest.total_size,
        manifest.chunk_count()
    );
    Ok(())
}

fn upload_tree(config: &ChunkFsConfig, root: &Path, snapshot: &Path) -> Result<()> {
    let tree = DirectoryTree::from_path(root)
        .with_context(|| format!("scanning {}", root.display()))?;
    tree.save_to_json(snapshot)?;

    let controller = open_controller(config)?;
    let result = controller.upload_tree(&tree, root);
    // Files uploaded before a failure are still worth indexing.
    controller.save_index(&config.index_path)?;
    let summary = result?;
    println!(
        "Uploaded {} files, {} chunks, {} bytes; snapshot {}",
        summary.files,
        summary.chunks,
        summary.bytes,
        snapshot.display()
    );
    Ok(())
}

fn download(config: &ChunkFsConfig, name: &str, out: &Path) -> Result<()> {
    if !config.index_path.exists() {
        anyhow::bail!("Index file not found: {}", config.index_path.display());
    }
    let controller = open_controller(config)?;
    let written = controller.download_file(name, out)?;
    println!("Downloaded {} to {} ({} bytes)", name, out.display(), written);
    Ok(())
}

fn mount_snapshot(
    config: &ChunkFsConfig,
    snapshot: &Path,
    mountpoint: &Path,
    placeholder: bool,
) -> Result<()> {
    let tree = DirectoryTree::load_from_json(snapshot)
        .with_context(|| format!("loading snapshot {}", snapshot.display()))?;
    let mount_opts = parse_mount_options(&config.mount_options)?;

    let content: Arc<dyn ContentSource> = if placeholder {
        Arc::new(PlaceholderContent)
    } else {
        let controller = open_controller(config)?;
        info!(files = controller.indexed_files().len(), "chunk index ready");
        Arc::new(ChunkContent::new(Arc::new(controller), config.cache()))
    };

    let adapter = Arc::new(FilesystemAdapter::new(tree, content));
    let fs_options = ChunkFsOptions {
        keep_cache: mount_opts.kernel_cache,
        ..ChunkFsOptions::for_current_user(config.attr_ttl())
    };
    let fs = ChunkFs::new(adapter, fs_options);
    mount(fs, mountpoint, &mount_opts)?;
    Ok(())
}
