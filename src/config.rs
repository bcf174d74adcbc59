//! Configuration for zealot
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, ZealotError};

/// Main configuration for a zealot datastore
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all cache files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── index.db         (key → blob index)
    ///     └── <sha512 hex>     (one gzip blob per distinct value)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: whether upserts fsync before returning
    pub index_sync: IndexSyncStrategy,

    /// Minimum number of log records before compaction on open is considered
    pub compact_min_records: usize,

    // -------------------------------------------------------------------------
    // Blob Configuration
    // -------------------------------------------------------------------------
    /// Gzip level, 0 (store) to 9 (best)
    pub compression_level: u32,

    /// Recompute the digest of every blob read and reject mismatches
    pub verify_blobs: bool,
}

/// Index sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSyncStrategy {
    /// fsync after every upsert (durable before the call returns)
    EveryWrite,

    /// Leave flushing to the OS. A crash may lose recent upserts, which then
    /// read as misses.
    OsBuffered,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./zealot_cache"),
            index_sync: IndexSyncStrategy::EveryWrite,
            compact_min_records: 1024,
            compression_level: 6,
            verify_blobs: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > 9 {
            return Err(ZealotError::Config(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ZealotError::Config("data_dir must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for index and blobs)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the index sync strategy
    pub fn index_sync(mut self, strategy: IndexSyncStrategy) -> Self {
        self.config.index_sync = strategy;
        self
    }

    /// Set the record count below which the index is never compacted
    pub fn compact_min_records(mut self, count: usize) -> Self {
        self.config.compact_min_records = count;
        self
    }

    /// Set the gzip compression level
    pub fn compression_level(mut self, level: u32) -> Self {
        self.config.compression_level = level;
        self
    }

    /// Enable or disable digest verification on blob reads
    pub fn verify_blobs(mut self, verify: bool) -> Self {
        self.config.verify_blobs = verify;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
