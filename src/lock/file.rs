//! File Lock Manager
//!
//! Cross-process table locks backed by OS advisory file locks.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::config::Config;
use crate::error::{Result, SlotError};

use super::{HeldLock, LockGuard, LockManager, LockMode, LockRecord, RetryPolicy};

/// Lock file inside each table directory
pub const LOCK_FILE: &str = ".lock";

/// Holder record written next to the lock file by exclusive holders
pub const OWNER_FILE: &str = ".lock.owner";

/// Lock manager using `flock` (Unix) / `LockFileEx` (Windows) on
/// `<table>/.lock`.
///
/// The kernel drops an advisory lock when the owning process exits, however
/// it exits, so a crashed holder can always be reclaimed. Locks taken
/// through separate `FileLockManager`s (or separate tables) in one process
/// also exclude each other, because each acquisition opens its own handle.
#[derive(Debug, Clone)]
pub struct FileLockManager {
    retry: RetryPolicy,
}

impl FileLockManager {
    pub fn new(config: &Config) -> Self {
        Self {
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn with_policy(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Read the holder record of a table, if one is present and readable
    pub fn read_owner(table_dir: &Path) -> Option<LockRecord> {
        let bytes = fs::read(table_dir.join(OWNER_FILE)).ok()?;
        bincode::deserialize(&bytes).ok()
    }

    /// Single non-blocking attempt
    fn try_acquire(&self, table_dir: &Path, mode: LockMode) -> Result<Option<LockGuard>> {
        let lock_path = table_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&lock_path)?;

        let attempt = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };

        match attempt {
            Ok(()) => {}
            Err(e) if is_contended(&e) => return Ok(None),
            Err(e) => return Err(SlotError::Io(e)),
        }

        let mut reclaimed_from = None;
        if mode == LockMode::Exclusive {
            // Nobody else holds the lock now, so a record still on disk was
            // left by a holder that never released it.
            if let Some(stale) = Self::read_owner(table_dir) {
                tracing::warn!(
                    "Reclaimed stale lock on {} from pid {} (acquired at {}ms)",
                    table_dir.display(),
                    stale.pid,
                    stale.acquired_at_ms
                );
                reclaimed_from = Some(stale);
            }
            if let Err(e) = write_owner(table_dir, &LockRecord::current(mode)) {
                let _ = FileExt::unlock(&file);
                return Err(e);
            }
        }

        let held = FileLockHold {
            file,
            table_dir: table_dir.to_path_buf(),
            mode,
        };
        Ok(Some(LockGuard::new(
            table_dir,
            mode,
            reclaimed_from,
            Box::new(held),
        )))
    }
}

impl LockManager for FileLockManager {
    fn acquire(&self, table_dir: &Path, mode: LockMode) -> Result<LockGuard> {
        match self.retry.run(|| self.try_acquire(table_dir, mode))? {
            Some(guard) => {
                tracing::trace!("Acquired {} lock on {}", mode, table_dir.display());
                Ok(guard)
            }
            None => {
                let holder_pid = Self::read_owner(table_dir).map(|r| r.pid);
                tracing::debug!(
                    "Timed out waiting for {} lock on {}",
                    mode,
                    table_dir.display()
                );
                Err(SlotError::LockTimeout {
                    table: table_dir.to_path_buf(),
                    mode,
                    waited_ms: self.retry.timeout.as_millis() as u64,
                    holder_pid,
                })
            }
        }
    }
}

/// Open lock file handle; unlocking happens on drop
struct FileLockHold {
    file: File,
    table_dir: PathBuf,
    mode: LockMode,
}

impl HeldLock for FileLockHold {}

impl Drop for FileLockHold {
    fn drop(&mut self) {
        // Record goes first: once unlocked, a leftover record would be
        // mistaken for a crashed holder.
        if self.mode == LockMode::Exclusive {
            if let Err(e) = fs::remove_file(self.table_dir.join(OWNER_FILE)) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        "Failed to remove lock record in {}: {}",
                        self.table_dir.display(),
                        e
                    );
                }
            }
        }
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(
                "Failed to release {} lock on {}: {}",
                self.mode,
                self.table_dir.display(),
                e
            );
        }
    }
}

fn write_owner(table_dir: &Path, record: &LockRecord) -> Result<()> {
    let bytes = bincode::serialize(record)?;
    let mut file = File::create(table_dir.join(OWNER_FILE))?;
    file.write_all(&bytes)?;
    Ok(())
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
