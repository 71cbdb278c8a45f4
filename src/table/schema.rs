//! Schema descriptor
//!
//! Ordered column → capacity mapping, persisted as `schema.bin`.
//!
//! ## File Format
//! ```text
//! ┌──────────┬────────────┬───────────┬───────────────┬──────────────────┐
//! │Magic (4) │Version (2) │ CRC32 (4) │ PayloadLen (4)│ Payload (bincode)│
//! │ "SLDB"   │ u16 LE     │ u32 LE    │ u32 LE        │                  │
//! └──────────┴────────────┴───────────┴───────────────┴──────────────────┘
//! ```

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlotError};
use crate::storage::{sync_dir, tmp_path};

/// Descriptor file name inside a table directory
pub const SCHEMA_FILE: &str = "schema.bin";

const MAGIC: &[u8; 4] = b"SLDB";
const VERSION: u16 = 1;
/// Magic (4) + Version (2) + CRC (4) + PayloadLen (4)
const HEADER_SIZE: usize = 14;

/// One column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    /// Content bytes per slot, excluding the terminator
    pub capacity: usize,
    /// Stable id naming the backing file; renames leave it alone
    pub file_id: u32,
}

impl ColumnDef {
    /// Backing file name, e.g. `col_000003.slot`
    pub fn file_name(&self) -> String {
        column_file_name(self.file_id)
    }
}

pub(crate) fn column_file_name(file_id: u32) -> String {
    format!("col_{:06}.slot", file_id)
}

/// Ordered table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Bumped on every descriptor write
    generation: u64,
    next_file_id: u32,
    columns: Vec<ColumnDef>,
}

impl Schema {
    /// Build a schema from `(name, capacity)` pairs in column order
    pub fn new(columns: &[(&str, usize)]) -> Result<Self> {
        if columns.is_empty() {
            return Err(SlotError::InvalidSchema(
                "a table needs at least one column".to_string(),
            ));
        }

        let mut schema = Self {
            generation: 0,
            next_file_id: 1,
            columns: Vec::with_capacity(columns.len()),
        };
        let mut seen = HashSet::new();
        for (name, capacity) in columns {
            if !seen.insert(*name) {
                return Err(SlotError::InvalidSchema(format!(
                    "column '{}' declared twice",
                    name
                )));
            }
            schema.push_column(name, *capacity)?;
        }
        Ok(schema)
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Position of a column in schema order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| SlotError::ColumnNotFound(name.to_string()))
    }

    /// Capacity of a column
    pub fn capacity(&self, name: &str) -> Result<usize> {
        self.column(name).map(|c| c.capacity)
    }

    // =========================================================================
    // Mutation (callers persist afterwards)
    // =========================================================================

    pub(crate) fn push_column(&mut self, name: &str, capacity: usize) -> Result<&ColumnDef> {
        if name.is_empty() {
            return Err(SlotError::InvalidSchema(
                "column name must not be empty".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(SlotError::InvalidSchema(format!(
                "column '{}' needs a positive capacity",
                name
            )));
        }
        if self.position(name).is_some() {
            return Err(SlotError::DuplicateColumn(name.to_string()));
        }

        let file_id = self.allocate_file_id();
        self.columns.push(ColumnDef {
            name: name.to_string(),
            capacity,
            file_id,
        });
        Ok(&self.columns[self.columns.len() - 1])
    }

    pub(crate) fn rename_column(&mut self, old: &str, new: &str) -> Result<()> {
        let index = self
            .position(old)
            .ok_or_else(|| SlotError::ColumnNotFound(old.to_string()))?;
        if new.is_empty() {
            return Err(SlotError::InvalidSchema(
                "column name must not be empty".to_string(),
            ));
        }
        if old != new && self.position(new).is_some() {
            return Err(SlotError::DuplicateColumn(new.to_string()));
        }
        self.columns[index].name = new.to_string();
        Ok(())
    }

    /// Point column `index` at a fresh file of `capacity`. Returns the new def.
    pub(crate) fn replace_file(&mut self, index: usize, capacity: usize) -> ColumnDef {
        let file_id = self.allocate_file_id();
        let column = &mut self.columns[index];
        column.capacity = capacity;
        column.file_id = file_id;
        column.clone()
    }

    pub(crate) fn bump_generation(&mut self) {
        self.generation += 1;
    }

    fn allocate_file_id(&mut self) -> u32 {
        let id = self.next_file_id;
        self.next_file_id += 1;
        id
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Load `schema.bin` from a table directory
    pub fn load(table_dir: &Path) -> Result<Self> {
        let path = table_dir.join(SCHEMA_FILE);
        let bytes = fs::read(&path)?;
        Self::decode(&bytes)
            .map_err(|e| SlotError::Corruption(format!("{}: {}", path.display(), e)))
    }

    /// Write `schema.bin` atomically (temp file + rename)
    pub fn persist(&self, table_dir: &Path) -> Result<()> {
        let path = table_dir.join(SCHEMA_FILE);
        let tmp = tmp_path(&path);
        let bytes = self.encode()?;

        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &path)?;
        sync_dir(table_dir)?;
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let crc = crc32fast::hash(&payload);

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < HEADER_SIZE {
            return Err(format!("descriptor truncated at {} bytes", bytes.len()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(format!("invalid magic {:?}", &bytes[0..4]));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(format!("unsupported descriptor version {}", version));
        }
        let crc = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let len = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;

        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != len {
            return Err(format!(
                "payload is {} bytes, header says {}",
                payload.len(),
                len
            ));
        }
        if crc32fast::hash(payload) != crc {
            return Err("checksum mismatch".to_string());
        }

        bincode::deserialize(payload).map_err(|e| e.to_string())
    }
}

/// True when `table_dir` holds a schema descriptor
pub(crate) fn schema_exists(table_dir: &Path) -> bool {
    table_dir.join(SCHEMA_FILE).is_file()
}

pub(crate) fn is_not_found(e: &SlotError) -> bool {
    matches!(e, SlotError::Io(io) if io.kind() == io::ErrorKind::NotFound)
}
