//! Storage Module
//!
//! One binary file per column, holding equal-width slots.
//!
//! ## Responsibilities
//! - Positional read/write of slot `i` without touching other slots
//! - Append as the only row-count-increasing operation
//! - Bounded-buffer sequential scans
//! - Crash-safe rewrites (temp file + atomic rename)
//!
//! ## File Format
//! ```text
//! ┌────────────────────────┐  offset 0
//! │ Slot 0 (capacity + 1)  │
//! ├────────────────────────┤  offset 1 * (capacity + 1)
//! │ Slot 1 (capacity + 1)  │
//! ├────────────────────────┤
//! │ ...                    │
//! ├────────────────────────┤  offset (n - 1) * (capacity + 1)
//! │ Slot n - 1             │
//! └────────────────────────┘  file length = n * (capacity + 1)
//! ```
//!
//! There is no header: the row count is the file length divided by the slot
//! width, and a remainder is corruption.

mod column_file;
mod scanner;
mod writer;

use std::path::{Path, PathBuf};

pub use column_file::ColumnFile;
pub use scanner::SlotScanner;
pub use writer::SlotWriter;

use crate::error::Result;

/// Sibling path used while a file is being rewritten
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Flush a directory entry so a completed rename survives power loss
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::fs::File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}
