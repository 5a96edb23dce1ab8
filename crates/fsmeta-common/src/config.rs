//! Configuration types for fsmeta
//!
//! This module defines configuration structures used by the metadata node.
//! Every section falls back to its defaults so a partial TOML file is valid.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for a metadata node
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node configuration
    pub node: NodeConfig,
    /// Partition configuration
    pub partition: PartitionConfig,
    /// Trash retention and reclamation
    pub trash: TrashConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check values that would make the node misbehave at runtime
    pub fn validate(&self) -> Result<()> {
        if self.trash.interval_secs == 0 {
            return Err(Error::Configuration(
                "trash.interval_secs must be greater than zero".into(),
            ));
        }
        if self.trash.expire_batch_size == 0 || self.trash.reclaim_batch_size == 0 {
            return Err(Error::Configuration(
                "trash batch sizes must be greater than zero".into(),
            ));
        }
        if self.partition.db_file.is_empty() {
            return Err(Error::Configuration("partition.db_file is empty".into()));
        }
        Ok(())
    }

    /// Path of the partition database
    #[must_use]
    pub fn partition_db_path(&self) -> PathBuf {
        self.node
            .data_dir
            .join(format!("partition-{}", self.partition.id))
            .join(&self.partition.db_file)
    }
}

/// Node identity configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name (human-readable identifier)
    pub name: String,
    /// Data directory for partition databases
    pub data_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "fsmeta-node".to_string(),
            data_dir: PathBuf::from("/var/lib/fsmeta"),
        }
    }
}

/// Metadata partition configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Partition ID
    pub id: u64,
    /// Database file name inside the partition directory
    pub db_file: String,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            id: 1,
            db_file: "meta.redb".to_string(),
        }
    }
}

/// Trash retention and reclamation configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrashConfig {
    /// Run the background trash GC
    pub enabled: bool,
    /// Age (seconds) after which a soft-deleted inode expires
    pub retention_secs: u64,
    /// GC pass interval (seconds)
    pub interval_secs: u64,
    /// Maximum inodes expired per pass
    pub expire_batch_size: usize,
    /// Maximum inodes purged per pass
    pub reclaim_batch_size: usize,
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_secs: 7 * 24 * 60 * 60, // 7 days
            interval_secs: 60,
            expire_batch_size: 1024,
            reclaim_batch_size: 1024,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
