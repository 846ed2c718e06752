use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chunkfs_transfer::{ChunkerConfig, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_PARALLELISM};

use crate::datacache::{ChunkCacheConfig, DEFAULT_CACHE_CHUNKS};
use crate::mount::DEFAULT_MOUNT_OPTIONS;

/// Settings shared by every `chunkfs` subcommand. Missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkFsConfig {
    pub max_chunk_size: usize,
    pub transfer_parallelism: usize,
    pub store_dir: PathBuf,
    pub index_path: PathBuf,
    pub cache_chunks: usize,
    pub attr_ttl_secs: u64,
    pub mount_options: String,
}

impl Default for ChunkFsConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            transfer_parallelism: DEFAULT_PARALLELISM,
            store_dir: PathBuf::from("./chunkfs-store"),
            index_path: PathBuf::from("./chunkfs-index.json"),
            cache_chunks: DEFAULT_CACHE_CHUNKS,
            attr_ttl_secs: 1,
            mount_options: DEFAULT_MOUNT_OPTIONS.to_string(),
        }
    }
}

impl ChunkFsConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: ChunkFsConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: ChunkFsConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Load `path` if given, otherwise defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn chunker(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_chunk_size: self.max_chunk_size,
            parallelism: self.transfer_parallelism,
        }
    }

    pub fn cache(&self) -> ChunkCacheConfig {
        ChunkCacheConfig::with_max_chunks(self.cache_chunks)
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values() {
        let config = ChunkFsConfig::default();
        assert_eq!(config.max_chunk_size, 4 * 1024 * 1024);
        assert_eq!(config.transfer_parallelism, 4);
        assert_eq!(config.store_dir, PathBuf::from("./chunkfs-store"));
        assert_eq!(config.index_path, PathBuf::from("./chunkfs-index.json"));
        assert_eq!(config.cache_chunks, 64);
        assert_eq!(config.attr_ttl(), Duration::from_secs(1));
        assert_eq!(config.mount_options, "ro,auto_unmount");
    }

    #[test]
    fn test_from_file_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{
                "max_chunk_size": 1024,
                "store_dir": "/srv/chunks",
                "cache_chunks": 8
            }}"#
        )
        .unwrap();

        let config = ChunkFsConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_chunk_size, 1024);
        assert_eq!(config.store_dir, PathBuf::from("/srv/chunks"));
        assert_eq!(config.cache_chunks, 8);
        assert_eq!(config.transfer_parallelism, 4);
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
max_chunk_size = 65536
transfer_parallelism = 8
index_path = "/var/lib/chunkfs/index.json"
attr_ttl_secs = 5
mount_options = "ro,allow_other"
"#
        )
        .unwrap();

        let config = ChunkFsConfig::from_file(file.path()).unwrap();
        assert_eq!(config.chunker().max_chunk_size, 65536);
        assert_eq!(config.chunker().parallelism, 8);
        assert_eq!(config.index_path, PathBuf::from("/var/lib/chunkfs/index.json"));
        assert_eq!(config.attr_ttl(), Duration::from_secs(5));
        assert_eq!(config.mount_options, "ro,allow_other");
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        assert!(ChunkFsConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_from_file_missing() {
        assert!(ChunkFsConfig::from_file(Path::new("/nonexistent/chunkfs.toml")).is_err());
    }

    #[test]
    fn test_load_without_path_is_default() {
        assert_eq!(ChunkFsConfig::load(None).unwrap(), ChunkFsConfig::default());
    }

    #[test]
    fn test_round_trip_toml() {
        let config = ChunkFsConfig {
            max_chunk_size: 77,
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();
        let back: ChunkFsConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, back);
    }
}
