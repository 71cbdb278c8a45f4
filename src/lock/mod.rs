//! Lock Module
//!
//! Table-scoped reader/writer locks that hold across processes.
//!
//! ## Responsibilities
//! - Shared locks for reads, exclusive locks for every mutation
//! - Bounded retry with backoff, then `LockTimeout`
//! - Reclaim locks whose holder died without releasing
//! - Release on every exit path (RAII guard)
//!
//! ## Implementations
//! - [`FileLockManager`]: OS advisory lock on `<table>/.lock`, visible to
//!   every process addressing the table directory
//! - [`MemoryLockManager`]: in-process counts, for single-process tests
//!
//! ## Lock Record
//! ```text
//! <table>/.lock.owner   bincode { pid: u32, mode, acquired_at_ms: u64 }
//! ```
//! Written by exclusive holders and removed on release. A record found by
//! the next exclusive holder was left by a process that never released.

mod file;
mod memory;
mod retry;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use file::{FileLockManager, LOCK_FILE, OWNER_FILE};
pub use memory::MemoryLockManager;
pub use retry::RetryPolicy;

/// Lock strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockMode {
    /// Many holders at once; excludes `Exclusive`
    Shared,

    /// Single holder; excludes everything else
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => f.write_str("shared"),
            LockMode::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// Who holds (or last held) a table lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub mode: LockMode,
    /// Unix time in milliseconds
    pub acquired_at_ms: u64,
}

impl LockRecord {
    /// Record for the current process, stamped now
    pub fn current(mode: LockMode) -> Self {
        Self {
            pid: std::process::id(),
            mode,
            acquired_at_ms: unix_millis(),
        }
    }
}

/// Capability to lock a table directory
pub trait LockManager: Send + Sync {
    /// Block (bounded by the configured timeout) until `mode` is granted.
    fn acquire(&self, table_dir: &Path, mode: LockMode) -> Result<LockGuard>;
}

/// Marker for the implementation-specific state that releases on drop
pub(crate) trait HeldLock: Send {}

/// A granted lock. Released when dropped.
pub struct LockGuard {
    table_dir: PathBuf,
    mode: LockMode,
    reclaimed_from: Option<LockRecord>,
    _held: Box<dyn HeldLock>,
}

impl LockGuard {
    pub(crate) fn new(
        table_dir: &Path,
        mode: LockMode,
        reclaimed_from: Option<LockRecord>,
        held: Box<dyn HeldLock>,
    ) -> Self {
        Self {
            table_dir: table_dir.to_path_buf(),
            mode,
            reclaimed_from,
            _held: held,
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn table_dir(&self) -> &Path {
        &self.table_dir
    }

    /// The stale record this acquisition replaced, if the previous holder
    /// died without releasing
    pub fn reclaimed_from(&self) -> Option<&LockRecord> {
        self.reclaimed_from.as_ref()
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("table_dir", &self.table_dir)
            .field("mode", &self.mode)
            .field("reclaimed_from", &self.reclaimed_from)
            .finish()
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
