//! Slot Writer
//!
//! Writes a complete column file to a temporary path and swaps it into place.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::codec::SlotLayout;
use crate::error::{Result, SlotError};

use super::{sync_dir, tmp_path};

/// Builds a column file from a sequence of slots.
///
/// Nothing is visible at the destination until `finish()` renames the fully
/// written and fsynced temporary file over it; until then any existing file
/// at the destination stays valid. Dropping an unfinished writer removes the
/// temporary file.
pub struct SlotWriter {
    /// Final destination
    path: PathBuf,
    /// Temporary file being written
    tmp_path: PathBuf,
    layout: SlotLayout,
    writer: Option<BufWriter<File>>,
    /// Slots written so far
    row_count: u64,
}

impl SlotWriter {
    /// Start writing a column file destined for `path`
    pub fn new(path: &Path, layout: SlotLayout) -> Result<Self> {
        let tmp_path = tmp_path(path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            layout,
            writer: Some(BufWriter::new(file)),
            row_count: 0,
        })
    }

    /// Append one encoded slot
    pub fn push(&mut self, slot: &[u8]) -> Result<()> {
        if slot.len() != self.layout.width() {
            return Err(SlotError::InvalidArgument(format!(
                "slot is {} bytes, column expects {}",
                slot.len(),
                self.layout.width()
            )));
        }
        let writer = self.writer.as_mut().ok_or_else(|| {
            SlotError::InvalidArgument("slot writer already finished".to_string())
        })?;
        writer.write_all(slot)?;
        self.row_count += 1;
        Ok(())
    }

    /// Number of slots pushed so far
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Flush, fsync and atomically rename into place. Returns the row count.
    pub fn finish(mut self) -> Result<u64> {
        let writer = match self.writer.take() {
            Some(w) => w,
            None => {
                return Err(SlotError::InvalidArgument(
                    "slot writer already finished".to_string(),
                ))
            }
        };

        let file = writer
            .into_inner()
            .map_err(|e| SlotError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;
        if let Some(dir) = self.path.parent() {
            sync_dir(dir)?;
        }

        tracing::debug!(
            "Rewrote {} ({} slots of {} bytes)",
            self.path.display(),
            self.row_count,
            self.layout.width()
        );
        Ok(self.row_count)
    }
}

impl Drop for SlotWriter {
    fn drop(&mut self) {
        // Still holding the writer means finish() never ran
        if self.writer.take().is_some() {
            if let Err(e) = fs::remove_file(&self.tmp_path) {
                tracing::warn!(
                    "Failed to remove abandoned {}: {}",
                    self.tmp_path.display(),
                    e
                );
            }
        }
    }
}
