//! Configuration for slotdb
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a slotdb engine
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Storage root. Every table lives in its own directory below it:
    ///   {data_dir}/
    ///     └── {table}/
    ///           ├── schema.bin          (schema descriptor)
    ///           ├── col_000001.slot     (one file per column)
    ///           ├── .lock               (advisory lock file)
    ///           └── backups/            (optimise snapshots)
    pub data_dir: PathBuf,

    /// How often column writes are fsynced
    pub sync_strategy: SyncStrategy,

    /// What to do with a value longer than its column capacity
    pub overflow_policy: OverflowPolicy,

    /// Number of slots read per chunk while scanning a column
    pub scan_buffer_slots: usize,

    // -------------------------------------------------------------------------
    // Lock Configuration
    // -------------------------------------------------------------------------
    /// Give up on a contended table lock after this long (milliseconds)
    pub lock_timeout_ms: u64,

    /// First backoff sleep between lock attempts (milliseconds)
    pub lock_retry_initial_ms: u64,

    /// Backoff ceiling; sleeps double up to this value (milliseconds)
    pub lock_retry_max_ms: u64,
}

/// Column write sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every slot write or append (safest, slowest)
    EveryWrite,

    /// Leave flushing to the OS; rewrites are still fsynced before the swap
    OsManaged,
}

/// Handling of values that do not fit their column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Fail with `ValueTooLong`
    Reject,

    /// Cut the value at the last UTF-8 boundary that fits
    Truncate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./slotdb_data"),
            sync_strategy: SyncStrategy::EveryWrite,
            overflow_policy: OverflowPolicy::Reject,
            scan_buffer_slots: 1024,
            lock_timeout_ms: 5000,
            lock_retry_initial_ms: 2,
            lock_retry_max_ms: 100,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Lock acquisition bound as a `Duration`
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (storage root for all tables)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the column write sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the overflow policy for oversized values
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow_policy = policy;
        self
    }

    /// Set the scan chunk size (in slots, clamped to at least 1)
    pub fn scan_buffer_slots(mut self, slots: usize) -> Self {
        self.config.scan_buffer_slots = slots.max(1);
        self
    }

    /// Set the lock acquisition timeout (in milliseconds)
    pub fn lock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.lock_timeout_ms = ms;
        self
    }

    /// Set the initial lock retry backoff (in milliseconds)
    pub fn lock_retry_initial_ms(mut self, ms: u64) -> Self {
        self.config.lock_retry_initial_ms = ms;
        self
    }

    /// Set the lock retry backoff ceiling (in milliseconds)
    pub fn lock_retry_max_ms(mut self, ms: u64) -> Self {
        self.config.lock_retry_max_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
