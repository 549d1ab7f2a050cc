//! Storage configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where and how channel state is persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/channels"),
            rocksdb: RocksDbConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Storage rooted at `data_dir` with default tuning
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Apply `HUB_DATA_DIR` when set
    pub fn apply_env(&mut self) {
        if let Ok(data_dir) = std::env::var("HUB_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }
    }
}

/// RocksDB tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 16,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}
