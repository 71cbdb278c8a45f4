//! Compaction and file housekeeping
//!
//! `optimise` is the sweep half of mark-and-sweep deletion: `delete` only
//! writes tombstones, this drops them.
//!
//! ## Rewrite Protocol
//! 1. Write every surviving column to a fresh `col_<id>.slot` (temp + rename)
//! 2. Atomically replace `schema.bin` pointing at the new files
//! 3. Remove files the descriptor no longer references
//!
//! A crash before step 2 leaves the old descriptor and old files intact;
//! the half-built files are removed by the next sweep.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use bytes::Bytes;

use crate::codec;
use crate::error::Result;
use crate::lock::unix_millis;
use crate::storage::{ColumnFile, SlotScanner};

use super::schema::SCHEMA_FILE;
use super::table::OpenTable;

/// Snapshot directory inside a table directory
pub const BACKUP_DIR: &str = "backups";

/// Outcome of [`Table::optimise`](super::Table::optimise)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimiseReport {
    pub rows_before: u64,
    pub rows_after: u64,
    /// Where the pre-compaction snapshot went, if one was requested
    pub backup_dir: Option<PathBuf>,
}

impl OptimiseReport {
    pub fn rows_removed(&self) -> u64 {
        self.rows_before - self.rows_after
    }
}

impl OpenTable {
    pub(super) fn optimise(&mut self, make_backup: bool) -> Result<OptimiseReport> {
        let rows_before = self.row_count();
        let backup_dir = if make_backup {
            Some(self.snapshot()?)
        } else {
            None
        };

        let survivors = self.surviving_ids()?;
        let rows_after = survivors.len() as u64;
        if rows_after == rows_before {
            tracing::debug!("Nothing to compact in {}", self.dir.display());
            return Ok(OptimiseReport {
                rows_before,
                rows_after,
                backup_dir,
            });
        }

        // Same survivor list for every column keeps them aligned
        let mut schema = self.schema.clone();
        let mut rebuilt = Vec::with_capacity(self.columns.len());
        for index in 0..self.columns.len() {
            let capacity = self.columns[index].capacity();
            let def = schema.replace_file(index, capacity);
            let scanner = self.columns[index].scan(self.chunk_slots())?;
            rebuilt.push(ColumnFile::build(
                &self.dir.join(def.file_name()),
                capacity,
                self.config.sync_strategy,
                keep_rows(scanner, &survivors),
            )?);
        }

        self.install_schema(schema)?;
        self.columns = rebuilt;
        self.sweep_orphans()?;

        Ok(OptimiseReport {
            rows_before,
            rows_after,
            backup_dir,
        })
    }

    /// Ids that are live in the first column, ascending
    fn surviving_ids(&self) -> Result<Vec<u64>> {
        let mut survivors = Vec::new();
        for item in self.columns[0].scan(self.chunk_slots())? {
            let (index, slot) = item?;
            if !codec::is_tombstone(&slot) {
                survivors.push(index);
            }
        }
        Ok(survivors)
    }

    /// Copy the descriptor and every column file to `backups/{unix_ms}/`
    fn snapshot(&self) -> Result<PathBuf> {
        let root = self.dir.join(BACKUP_DIR);
        fs::create_dir_all(&root)?;

        let stamp = unix_millis();
        let mut target = root.join(stamp.to_string());
        let mut attempt = 1;
        loop {
            match fs::create_dir(&target) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    target = root.join(format!("{}-{}", stamp, attempt));
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        fs::copy(self.dir.join(SCHEMA_FILE), target.join(SCHEMA_FILE))?;
        for (def, column) in self.schema.columns().iter().zip(&self.columns) {
            fs::copy(column.path(), target.join(def.file_name()))?;
        }

        tracing::info!("Backed up {} to {}", self.dir.display(), target.display());
        Ok(target)
    }

    /// Remove `*.tmp` leftovers and column files the descriptor no longer
    /// names. Caller holds the exclusive lock.
    pub(super) fn sweep_orphans(&self) -> Result<usize> {
        let referenced: HashSet<String> =
            self.schema.columns().iter().map(|c| c.file_name()).collect();

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };

            let orphan = name.ends_with(".tmp")
                || (name.starts_with("col_") && name.ends_with(".slot") && !referenced.contains(name));
            if orphan {
                fs::remove_file(&path)?;
                tracing::debug!("Removed orphaned {}", path.display());
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("Swept {} orphaned files from {}", removed, self.dir.display());
        }
        Ok(removed)
    }
}

/// Yield the slots whose index appears in `survivors` (ascending)
fn keep_rows<'a>(
    scanner: SlotScanner,
    survivors: &'a [u64],
) -> impl Iterator<Item = Result<Bytes>> + 'a {
    let mut next = 0;
    scanner.filter_map(move |item| match item {
        Err(e) => Some(Err(e)),
        Ok((index, slot)) => {
            if survivors.get(next) == Some(&index) {
                next += 1;
                Some(Ok(slot))
            } else {
                None
            }
        }
    })
}
