//! Error types for slotdb
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::lock::LockMode;

/// Result type alias using SlotError
pub type Result<T> = std::result::Result<T, SlotError>;

/// Unified error type for slotdb operations
#[derive(Debug, Error)]
pub enum SlotError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Value too long: {len} bytes exceeds column capacity {capacity}")]
    ValueTooLong { len: usize, capacity: usize },

    #[error("Value contains the reserved filler byte 0x00")]
    ReservedByte,

    // -------------------------------------------------------------------------
    // Schema Errors
    // -------------------------------------------------------------------------
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    // -------------------------------------------------------------------------
    // Row Errors
    // -------------------------------------------------------------------------
    #[error("Row not found: {0}")]
    NotFound(u64),

    #[error("Slot index {index} out of range (row count {row_count})")]
    OutOfRange { index: u64, row_count: u64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Table Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Table not open: {0}")]
    TableNotOpen(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Table corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Timed out after {waited_ms}ms waiting for {mode:?} lock on {}{}", .table.display(), holder_suffix(.holder_pid))]
    LockTimeout {
        table: PathBuf,
        mode: LockMode,
        waited_ms: u64,
        holder_pid: Option<u32>,
    },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SlotError {
    /// Prefix a `Corruption` message with where it was found; other
    /// variants pass through unchanged
    pub(crate) fn context(self, location: impl std::fmt::Display) -> Self {
        match self {
            SlotError::Corruption(msg) => {
                SlotError::Corruption(format!("{}: {}", location, msg))
            }
            other => other,
        }
    }
}

fn holder_suffix(pid: &Option<u32>) -> String {
    match pid {
        Some(pid) => format!(" (held by pid {})", pid),
        None => String::new(),
    }
}

impl From<bincode::Error> for SlotError {
    fn from(e: bincode::Error) -> Self {
        SlotError::Serialization(e.to_string())
    }
}
