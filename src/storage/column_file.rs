//! Column File
//!
//! Positional access to one column's fixed-width slots.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};

use crate::codec::{self, SlotLayout, SlotValue};
use crate::config::SyncStrategy;
use crate::error::{Result, SlotError};

use super::{SlotScanner, SlotWriter};

/// A single column stored as `row_count` slots of `capacity + 1` bytes.
///
/// The cached row count is derived from the file length; call `refresh()`
/// after another handle may have appended.
pub struct ColumnFile {
    path: PathBuf,
    layout: SlotLayout,
    file: File,
    row_count: u64,
    sync: SyncStrategy,
}

impl ColumnFile {
    /// Create a new, empty column file. Fails if the file already exists.
    pub fn create(path: &Path, capacity: usize, sync: SyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.sync_all()?;

        Ok(Self {
            path: path.to_path_buf(),
            layout: SlotLayout::new(capacity),
            file,
            row_count: 0,
            sync,
        })
    }

    /// Open an existing column file and derive its row count
    pub fn open(path: &Path, capacity: usize, sync: SyncStrategy) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let layout = SlotLayout::new(capacity);
        let row_count = layout
            .row_count(file.metadata()?.len())
            .map_err(|e| e.context(path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            layout,
            file,
            row_count,
            sync,
        })
    }

    /// Write a complete column file at `path` from `slots` and open it.
    ///
    /// Goes through a temporary file, so an existing file at `path` stays
    /// intact until the new one is complete.
    pub fn build<I>(path: &Path, capacity: usize, sync: SyncStrategy, slots: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Bytes>>,
    {
        let mut writer = SlotWriter::new(path, SlotLayout::new(capacity))?;
        for slot in slots {
            writer.push(&slot?)?;
        }
        writer.finish()?;
        Self::open(path, capacity, sync)
    }

    // =========================================================================
    // Slot Access
    // =========================================================================

    /// Read the raw bytes of slot `index`
    pub fn read_slot(&mut self, index: u64) -> Result<Bytes> {
        self.check_index(index)?;

        let mut slot = BytesMut::zeroed(self.layout.width());
        self.file.seek(SeekFrom::Start(self.layout.offset(index)))?;
        self.file.read_exact(&mut slot[..])?;
        Ok(slot.freeze())
    }

    /// Read and decode slot `index`
    pub fn read_value(&mut self, index: u64) -> Result<SlotValue> {
        let slot = self.read_slot(index)?;
        codec::decode(&slot)
    }

    /// Overwrite slot `index` in place. Never changes the file length.
    pub fn write_slot(&mut self, index: u64, slot: &[u8]) -> Result<()> {
        self.check_index(index)?;
        self.check_width(slot)?;
        self.write_at(index, slot)
    }

    /// Append one slot at the end, returning its index.
    ///
    /// On failure the file is cut back to its previous length, so a short
    /// write never leaves a partial slot behind.
    pub fn append_slot(&mut self, slot: &[u8]) -> Result<u64> {
        self.check_width(slot)?;

        let index = self.row_count;
        if let Err(e) = self.write_at(index, slot) {
            if let Err(undo) = self.truncate_to(index) {
                tracing::error!(
                    "Failed to roll back append to {}: {}",
                    self.path.display(),
                    undo
                );
            }
            return Err(e);
        }
        self.row_count += 1;
        Ok(index)
    }

    /// Drop every slot from `row_count` onwards
    pub fn truncate_to(&mut self, row_count: u64) -> Result<()> {
        if row_count > self.row_count {
            return Err(SlotError::OutOfRange {
                index: row_count,
                row_count: self.row_count,
            });
        }
        self.file.set_len(self.layout.offset(row_count))?;
        self.maybe_sync()?;
        self.row_count = row_count;
        Ok(())
    }

    /// Sequential scan over every slot, reading `chunk_slots` at a time.
    ///
    /// Each call starts a fresh scan from slot 0.
    pub fn scan(&self, chunk_slots: usize) -> Result<SlotScanner> {
        SlotScanner::new(&self.path, self.layout, self.row_count, chunk_slots)
    }

    /// Replace the whole file with `slots` via temp file + rename.
    ///
    /// If this fails before the rename the original file is untouched.
    /// Returns the new row count.
    ///
    /// Only atomic for this one file. Tables rewrite columns through
    /// `build` under fresh file names and swap the schema descriptor
    /// instead, so all columns change together.
    pub fn truncate_and_rewrite<I>(&mut self, slots: I) -> Result<u64>
    where
        I: IntoIterator<Item = Result<Bytes>>,
    {
        let rebuilt = Self::build(&self.path, self.layout.capacity(), self.sync, slots)?;
        *self = rebuilt;
        Ok(self.row_count)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Re-derive the row count from the current file length
    pub fn refresh(&mut self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        self.row_count = self
            .layout
            .row_count(len)
            .map_err(|e| e.context(self.path.display()))?;
        Ok(self.row_count)
    }

    /// Force written slots to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> SlotLayout {
        self.layout
    }

    pub fn capacity(&self) -> usize {
        self.layout.capacity()
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_index(&self, index: u64) -> Result<()> {
        if index >= self.row_count {
            return Err(SlotError::OutOfRange {
                index,
                row_count: self.row_count,
            });
        }
        Ok(())
    }

    fn check_width(&self, slot: &[u8]) -> Result<()> {
        if slot.len() != self.layout.width() {
            return Err(SlotError::InvalidArgument(format!(
                "slot is {} bytes, column expects {}",
                slot.len(),
                self.layout.width()
            )));
        }
        Ok(())
    }

    fn write_at(&mut self, index: u64, slot: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.layout.offset(index)))?;
        self.file.write_all(slot)?;
        self.maybe_sync()
    }

    fn maybe_sync(&self) -> Result<()> {
        match self.sync {
            SyncStrategy::EveryWrite => self.sync(),
            SyncStrategy::OsManaged => Ok(()),
        }
    }
}

impl std::fmt::Debug for ColumnFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnFile")
            .field("path", &self.path)
            .field("capacity", &self.layout.capacity())
            .field("row_count", &self.row_count)
            .finish()
    }
}
