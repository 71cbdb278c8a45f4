//! Slot Scanner
//!
//! Sequential forward iteration over a column file with a bounded buffer.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bytes::{Bytes, BytesMut};

use crate::codec::SlotLayout;
use crate::error::{Result, SlotError};

/// Iterator over `(index, slot)` pairs in ascending index order.
///
/// Holds its own file handle, so scanning never disturbs positional reads
/// on the owning `ColumnFile`. At most `chunk_slots` slots are buffered.
pub struct SlotScanner {
    file: File,
    layout: SlotLayout,
    /// Stop after this many slots (row count when the scan started)
    row_count: u64,
    next_index: u64,
    chunk: BytesMut,
    chunk_slots: usize,
}

impl SlotScanner {
    pub(super) fn new(
        path: &Path,
        layout: SlotLayout,
        row_count: u64,
        chunk_slots: usize,
    ) -> Result<Self> {
        let file = File::open(path)?;
        let chunk_slots = chunk_slots.max(1);
        Ok(Self {
            file,
            layout,
            row_count,
            next_index: 0,
            chunk: BytesMut::with_capacity(chunk_slots * layout.width()),
            chunk_slots,
        })
    }

    /// Restart from slot 0
    pub fn rewind(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.next_index = 0;
        self.chunk.clear();
        Ok(())
    }

    /// Number of slots this scan will yield in total
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    fn fill(&mut self) -> Result<()> {
        let remaining = self.row_count - self.next_index;
        let slots = remaining.min(self.chunk_slots as u64) as usize;
        self.chunk.clear();
        self.chunk.resize(slots * self.layout.width(), 0);
        self.file.read_exact(&mut self.chunk[..]).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SlotError::Corruption(format!(
                    "column file ended before slot {} of {}",
                    self.next_index, self.row_count
                ))
            } else {
                SlotError::Io(e)
            }
        })
    }
}

impl Iterator for SlotScanner {
    type Item = Result<(u64, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index >= self.row_count {
            return None;
        }

        if self.chunk.is_empty() {
            if let Err(e) = self.fill() {
                // Fuse after an error
                self.next_index = self.row_count;
                return Some(Err(e));
            }
        }

        let slot = self.chunk.split_to(self.layout.width()).freeze();
        let index = self.next_index;
        self.next_index += 1;
        Some(Ok((index, slot)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.row_count - self.next_index) as usize;
        (remaining, Some(remaining))
    }
}
