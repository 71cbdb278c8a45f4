//! Slot geometry
//!
//! Fixed-width addressing for a single column.

use crate::error::{Result, SlotError};

/// Geometry of one column's slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    capacity: usize,
}

impl SlotLayout {
    /// Layout for a column of the given capacity (content bytes, excluding terminator)
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes per slot: content + terminator
    pub fn width(&self) -> usize {
        self.capacity + 1
    }

    /// Byte offset of slot `index`
    pub fn offset(&self, index: u64) -> u64 {
        index * self.width() as u64
    }

    /// Row count implied by a file length.
    ///
    /// A length that is not a whole number of slots means a torn write or a
    /// foreign file and is reported as corruption.
    pub fn row_count(&self, file_len: u64) -> Result<u64> {
        let width = self.width() as u64;
        if file_len % width != 0 {
            return Err(SlotError::Corruption(format!(
                "file length {} is not a multiple of slot width {}",
                file_len, width
            )));
        }
        Ok(file_len / width)
    }
}
