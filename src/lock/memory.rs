//! In-memory Lock Manager
//!
//! Reader/writer counts per table path, visible only inside this process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, SlotError};

use super::{HeldLock, LockGuard, LockManager, LockMode, RetryPolicy};

#[derive(Debug, Default)]
struct Holders {
    readers: usize,
    writer: bool,
}

type LockTable = Arc<Mutex<HashMap<PathBuf, Holders>>>;

/// Lock manager for single-process use and tests.
///
/// Clones share the same lock table.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockManager {
    tables: LockTable,
    retry: RetryPolicy,
}

impl MemoryLockManager {
    pub fn new(config: &Config) -> Self {
        Self {
            tables: LockTable::default(),
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn with_policy(retry: RetryPolicy) -> Self {
        Self {
            tables: LockTable::default(),
            retry,
        }
    }

    /// Current `(readers, writer)` for a table (for tests)
    pub fn holders(&self, table_dir: &Path) -> (usize, bool) {
        self.tables
            .lock()
            .get(table_dir)
            .map(|h| (h.readers, h.writer))
            .unwrap_or((0, false))
    }

    fn try_acquire(&self, table_dir: &Path, mode: LockMode) -> Option<LockGuard> {
        let mut tables = self.tables.lock();
        let holders = tables.entry(table_dir.to_path_buf()).or_default();

        let granted = match mode {
            LockMode::Shared if !holders.writer => {
                holders.readers += 1;
                true
            }
            LockMode::Exclusive if !holders.writer && holders.readers == 0 => {
                holders.writer = true;
                true
            }
            _ => false,
        };

        if !granted {
            return None;
        }

        let held = MemoryLockHold {
            tables: Arc::clone(&self.tables),
            table_dir: table_dir.to_path_buf(),
            mode,
        };
        Some(LockGuard::new(table_dir, mode, None, Box::new(held)))
    }
}

impl LockManager for MemoryLockManager {
    fn acquire(&self, table_dir: &Path, mode: LockMode) -> Result<LockGuard> {
        match self.retry.run(|| Ok(self.try_acquire(table_dir, mode)))? {
            Some(guard) => Ok(guard),
            None => Err(SlotError::LockTimeout {
                table: table_dir.to_path_buf(),
                mode,
                waited_ms: self.retry.timeout.as_millis() as u64,
                holder_pid: None,
            }),
        }
    }
}

struct MemoryLockHold {
    tables: LockTable,
    table_dir: PathBuf,
    mode: LockMode,
}

impl HeldLock for MemoryLockHold {}

impl Drop for MemoryLockHold {
    fn drop(&mut self) {
        let mut tables = self.tables.lock();
        let now_free = match tables.get_mut(&self.table_dir) {
            Some(holders) => {
                match self.mode {
                    LockMode::Shared => holders.readers = holders.readers.saturating_sub(1),
                    LockMode::Exclusive => holders.writer = false,
                }
                holders.readers == 0 && !holders.writer
            }
            None => false,
        };
        if now_free {
            tables.remove(&self.table_dir);
        }
    }
}
