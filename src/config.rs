//! Configuration for epochkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvError, Result};

/// Main configuration for an epochkv engine
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory for the commit log. `None` keeps the engine purely in memory.
    /// Internal structure:
    ///   {data_dir}/
    ///     └── commit.log       (write-ahead commit log)
    pub data_dir: Option<PathBuf>,

    /// Pool capacity in payload bytes
    pub pool_capacity: u64,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the commit log
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // Object Cache Configuration
    // -------------------------------------------------------------------------
    /// Nominal number of cached object references
    pub object_cache_capacity: usize,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            pool_capacity: 1024 * 1024 * 1024, // 1 GiB
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            object_cache_capacity: 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pool_capacity == 0 {
            return Err(KvError::Config("pool_capacity must be non-zero".to_string()));
        }
        if self.object_cache_capacity == 0 {
            return Err(KvError::Config(
                "object_cache_capacity must be non-zero".to_string(),
            ));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(KvError::Config(
                "EveryNEntries sync count must be non-zero".to_string(),
            ));
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
    /// Make the engine durable, logging commits under `path`
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(path.into());
        self
    }

    /// Set the pool capacity (in payload bytes)
    pub fn pool_capacity(mut self, bytes: u64) -> Self {
        self.config.pool_capacity = bytes;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the nominal object cache capacity (entry count)
    pub fn object_cache_capacity(mut self, entries: usize) -> Self {
        self.config.object_cache_capacity = entries;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
