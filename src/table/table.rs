//! Table handle
//!
//! Row CRUD and schema evolution over a set of aligned column files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::codec::{self, SlotValue};
use crate::config::{Config, OverflowPolicy};
use crate::error::{Result, SlotError};
use crate::lock::{LockManager, LockMode};
use crate::storage::ColumnFile;

use super::compaction::OptimiseReport;
use super::query::FindOptions;
use super::schema::{is_not_found, schema_exists, ColumnDef, Schema};
use super::{Record, Row};

/// Snapshot of a table's size, produced by [`Table::verify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    /// Physical rows, tombstones included
    pub rows: u64,
    /// Rows not tombstoned
    pub live_rows: u64,
    pub columns: usize,
    /// Schema descriptor generation
    pub generation: u64,
}

/// Handle lifecycle
enum TableState {
    /// Resolved but not loaded yet; the first operation opens it
    Unopened,
    Open(OpenTable),
    /// Explicitly closed; operations fail with `TableNotOpen`
    Closed,
}

/// Handle to one table directory.
///
/// ## Concurrency
/// - Calls on one handle are serialized by an internal mutex
/// - Calls across handles (and processes) are ordered by the table lock:
///   shared for reads, exclusive for writes
/// - After taking the lock the handle re-reads the descriptor, so schema
///   changes and compactions made elsewhere are picked up
pub struct Table {
    name: String,
    dir: PathBuf,
    config: Arc<Config>,
    locks: Arc<dyn LockManager>,
    state: Mutex<TableState>,
}

impl Table {
    pub(crate) fn new(
        name: &str,
        dir: PathBuf,
        config: Arc<Config>,
        locks: Arc<dyn LockManager>,
    ) -> Self {
        Self {
            name: name.to_string(),
            dir,
            config,
            locks,
            state: Mutex::new(TableState::Unopened),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load the schema and open every column file.
    ///
    /// Also reopens a handle that was closed.
    pub fn open(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let TableState::Open(_) = *state {
            return Ok(());
        }
        if !schema_exists(&self.dir) {
            return Err(SlotError::TableNotFound(self.name.clone()));
        }

        let _guard = self.locks.acquire(&self.dir, LockMode::Shared)?;
        let open = OpenTable::load(&self.dir, &self.config).map_err(|e| self.not_found(e))?;
        tracing::debug!(
            "Opened table '{}' ({} columns, {} rows)",
            self.name,
            open.columns.len(),
            open.row_count()
        );
        *state = TableState::Open(open);
        Ok(())
    }

    /// Close the handle, releasing its column file handles
    pub fn close(&self) {
        let mut state = self.state.lock();
        if let TableState::Open(_) = *state {
            tracing::debug!("Closed table '{}'", self.name);
        }
        *state = TableState::Closed;
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock(), TableState::Open(_))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Row Operations
    // =========================================================================

    /// Append a record, returning its row id.
    ///
    /// Columns missing from `record` are stored as empty strings. Fields not
    /// in the schema fail with `SchemaMismatch` before anything is written.
    /// If an append fails partway, columns already extended are cut back so
    /// the table keeps its previous rows and stays aligned.
    pub fn create(&self, record: &Record) -> Result<u64> {
        self.with_open(LockMode::Exclusive, |open| {
            let slots = open.encode_record(record)?;
            let id = open.row_count();
            for (index, slot) in slots.iter().enumerate() {
                if let Err(e) = open.columns[index].append_slot(slot) {
                    open.roll_back_append(index, id);
                    return Err(e);
                }
            }
            tracing::trace!("Appended row {} to '{}'", id, open.dir.display());
            Ok(id)
        })
    }

    /// Read full records. Tombstoned or out-of-range ids fail with `NotFound`.
    pub fn get(&self, ids: &[u64]) -> Result<Vec<Row>> {
        self.with_open(LockMode::Shared, |open| {
            ids.iter().map(|&id| open.read_row(id)).collect()
        })
    }

    /// Overwrite fields of existing rows in place.
    ///
    /// Every id and field is validated before the first byte is written.
    /// Returns the number of rows updated.
    pub fn update(&self, ids: &[u64], changes: &Record) -> Result<usize> {
        self.with_open(LockMode::Exclusive, |open| {
            let changes = open.encode_changes(changes)?;
            for &id in ids {
                open.check_live(id)?;
            }
            for &id in ids {
                for (index, slot) in &changes {
                    open.columns[*index].write_slot(id, slot)?;
                }
            }
            tracing::debug!("Updated {} rows in table '{}'", ids.len(), self.name);
            Ok(ids.len())
        })
    }

    /// Tombstone rows in every column.
    ///
    /// Deleting an already deleted row is a no-op; out-of-range ids fail
    /// with `NotFound` before anything is written. Returns the number of
    /// rows that were live.
    pub fn delete(&self, ids: &[u64]) -> Result<usize> {
        self.with_open(LockMode::Exclusive, |open| {
            let row_count = open.row_count();
            if let Some(&id) = ids.iter().find(|&&id| id >= row_count) {
                return Err(SlotError::NotFound(id));
            }

            let tombstones: Vec<Bytes> = open
                .columns
                .iter()
                .map(|c| codec::tombstone(c.capacity()))
                .collect();

            let mut deleted = 0;
            for &id in ids {
                let was_live = !codec::is_tombstone(&open.columns[0].read_slot(id)?);
                // Rewrite every column even for a dead row, so a delete torn
                // by a crash is completed by repeating it
                for (column, tombstone) in open.columns.iter_mut().zip(&tombstones) {
                    column.write_slot(id, tombstone)?;
                }
                if was_live {
                    deleted += 1;
                }
            }
            tracing::debug!("Deleted {} rows from table '{}'", deleted, self.name);
            Ok(deleted)
        })
    }

    /// Ids of live rows matching every predicate field, ascending
    pub fn find(&self, predicate: &Record, options: FindOptions) -> Result<Vec<u64>> {
        self.with_open(LockMode::Shared, |open| open.find(predicate, options))
    }

    // =========================================================================
    // Schema Operations
    // =========================================================================

    /// Add a column, filling existing rows with `default_value`
    pub fn add_column(&self, name: &str, capacity: usize, default_value: &str) -> Result<()> {
        self.with_open(LockMode::Exclusive, |open| {
            open.add_column(name, capacity, default_value)?;
            tracing::info!(
                "Added column '{}' ({} bytes) to table '{}'",
                name,
                capacity,
                self.name
            );
            Ok(())
        })
    }

    /// Rename a column. Only the descriptor changes.
    pub fn rename_column(&self, old: &str, new: &str) -> Result<()> {
        self.with_open(LockMode::Exclusive, |open| {
            let mut schema = open.schema.clone();
            schema.rename_column(old, new)?;
            open.install_schema(schema)?;
            tracing::info!(
                "Renamed column '{}' to '{}' in table '{}'",
                old,
                new,
                self.name
            );
            Ok(())
        })
    }

    /// Re-pad every row of a column to a new capacity
    pub fn resize_column(&self, name: &str, capacity: usize) -> Result<()> {
        self.with_open(LockMode::Exclusive, |open| {
            if open.resize_column(name, capacity)? {
                tracing::info!(
                    "Resized column '{}' of table '{}' to {} bytes",
                    name,
                    self.name,
                    capacity
                );
            }
            Ok(())
        })
    }

    /// Drop tombstoned rows, renumbering survivors contiguously.
    ///
    /// With `make_backup`, the current files are copied to
    /// `backups/{unix_ms}/` first.
    pub fn optimise(&self, make_backup: bool) -> Result<OptimiseReport> {
        self.with_open(LockMode::Exclusive, |open| {
            let report = open.optimise(make_backup)?;
            tracing::info!(
                "Optimised table '{}': {} -> {} rows",
                self.name,
                report.rows_before,
                report.rows_after
            );
            Ok(report)
        })
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Current schema
    pub fn schema(&self) -> Result<Schema> {
        self.with_open(LockMode::Shared, |open| Ok(open.schema.clone()))
    }

    /// Physical row count, tombstones included
    pub fn row_count(&self) -> Result<u64> {
        self.with_open(LockMode::Shared, |open| Ok(open.row_count()))
    }

    /// Rows not tombstoned
    pub fn live_count(&self) -> Result<u64> {
        self.with_open(LockMode::Shared, |open| open.live_count())
    }

    /// Decode every slot of every column and check alignment
    pub fn verify(&self) -> Result<TableStats> {
        self.with_open(LockMode::Shared, |open| open.verify())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Run `op` on the open table while holding the table lock in `mode`
    fn with_open<T>(
        &self,
        mode: LockMode,
        op: impl FnOnce(&mut OpenTable) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock();
        match *state {
            TableState::Closed => return Err(SlotError::TableNotOpen(self.name.clone())),
            TableState::Unopened if !schema_exists(&self.dir) => {
                return Err(SlotError::TableNotFound(self.name.clone()))
            }
            _ => {}
        }

        let _guard = self.locks.acquire(&self.dir, mode)?;

        if matches!(*state, TableState::Unopened) {
            let open = OpenTable::load(&self.dir, &self.config).map_err(|e| self.not_found(e))?;
            *state = TableState::Open(open);
        } else if let TableState::Open(open) = &mut *state {
            open.refresh().map_err(|e| self.not_found(e))?;
        }

        match &mut *state {
            TableState::Open(open) => op(open),
            _ => Err(SlotError::TableNotOpen(self.name.clone())),
        }
    }

    /// A vanished descriptor means the table is gone
    fn not_found(&self, e: SlotError) -> SlotError {
        if is_not_found(&e) {
            SlotError::TableNotFound(self.name.clone())
        } else {
            e
        }
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("open", &self.is_open())
            .finish()
    }
}

// =============================================================================
// Open Table
// =============================================================================

/// Loaded schema plus one open file per column, in schema order
pub(super) struct OpenTable {
    pub(super) dir: PathBuf,
    pub(super) config: Arc<Config>,
    pub(super) schema: Schema,
    pub(super) columns: Vec<ColumnFile>,
}

impl OpenTable {
    fn load(dir: &Path, config: &Arc<Config>) -> Result<Self> {
        let schema = Schema::load(dir)?;
        Self::from_schema(dir, config, schema)
    }

    fn from_schema(dir: &Path, config: &Arc<Config>, schema: Schema) -> Result<Self> {
        if schema.is_empty() {
            return Err(SlotError::Corruption(format!(
                "{}: schema has no columns",
                dir.display()
            )));
        }

        let columns = schema
            .columns()
            .iter()
            .map(|def| open_column(dir, def, config))
            .collect::<Result<Vec<_>>>()?;

        let table = Self {
            dir: dir.to_path_buf(),
            config: Arc::clone(config),
            schema,
            columns,
        };
        table.check_alignment()?;
        Ok(table)
    }

    /// Pick up changes made through other handles since the last call
    fn refresh(&mut self) -> Result<()> {
        let on_disk = Schema::load(&self.dir)?;
        if on_disk.generation() != self.schema.generation() {
            tracing::debug!(
                "Schema of {} moved from generation {} to {}, reopening columns",
                self.dir.display(),
                self.schema.generation(),
                on_disk.generation()
            );
            *self = Self::from_schema(&self.dir, &self.config, on_disk)?;
            return Ok(());
        }

        for column in &mut self.columns {
            column.refresh()?;
        }
        self.check_alignment()
    }

    fn check_alignment(&self) -> Result<()> {
        let expected = self.row_count();
        let first = &self.schema.columns()[0].name;
        for (def, column) in self.schema.columns().iter().zip(&self.columns) {
            if column.row_count() != expected {
                return Err(SlotError::Corruption(format!(
                    "{}: column '{}' has {} rows but '{}' has {}",
                    self.dir.display(),
                    def.name,
                    column.row_count(),
                    first,
                    expected
                )));
            }
        }
        Ok(())
    }

    /// Rows in the table; every column agrees after `check_alignment`
    pub(super) fn row_count(&self) -> u64 {
        self.columns[0].row_count()
    }

    pub(super) fn chunk_slots(&self) -> usize {
        self.config.scan_buffer_slots
    }

    pub(super) fn encode(&self, value: &str, capacity: usize) -> Result<Bytes> {
        encode_with(self.config.overflow_policy, value, capacity)
    }

    /// Persist `schema` as the next generation and adopt it
    pub(super) fn install_schema(&mut self, mut schema: Schema) -> Result<()> {
        schema.bump_generation();
        schema.persist(&self.dir)?;
        self.schema = schema;
        Ok(())
    }

    // =========================================================================
    // Rows
    // =========================================================================

    /// One encoded slot per column, in schema order
    fn encode_record(&self, record: &Record) -> Result<Vec<Bytes>> {
        if let Some(field) = record.keys().find(|k| self.schema.position(k).is_none()) {
            return Err(SlotError::SchemaMismatch(format!(
                "field '{}' is not a column of this table",
                field
            )));
        }

        self.schema
            .columns()
            .iter()
            .map(|def| {
                let value = record.get(&def.name).map(String::as_str).unwrap_or("");
                self.encode(value, def.capacity)
            })
            .collect()
    }

    /// `(column index, encoded slot)` for each changed field
    fn encode_changes(&self, changes: &Record) -> Result<Vec<(usize, Bytes)>> {
        changes
            .iter()
            .map(|(field, value)| {
                let index = self.schema.position(field).ok_or_else(|| {
                    SlotError::SchemaMismatch(format!(
                        "field '{}' is not a column of this table",
                        field
                    ))
                })?;
                let slot = self.encode(value, self.schema.columns()[index].capacity)?;
                Ok((index, slot))
            })
            .collect()
    }

    /// `NotFound` unless `id` is in range and live in the first column
    fn check_live(&mut self, id: u64) -> Result<()> {
        if id >= self.row_count() {
            return Err(SlotError::NotFound(id));
        }
        if codec::is_tombstone(&self.columns[0].read_slot(id)?) {
            return Err(SlotError::NotFound(id));
        }
        Ok(())
    }

    /// Cut the first `appended` columns back to `row_count` rows
    fn roll_back_append(&mut self, appended: usize, row_count: u64) {
        for column in &mut self.columns[..appended] {
            if let Err(e) = column.truncate_to(row_count) {
                tracing::error!(
                    "Failed to roll back append to {}: {}",
                    column.path().display(),
                    e
                );
            }
        }
        tracing::warn!(
            "Rolled back partial append at row {} in {}",
            row_count,
            self.dir.display()
        );
    }

    fn read_row(&mut self, id: u64) -> Result<Row> {
        if id >= self.row_count() {
            return Err(SlotError::NotFound(id));
        }

        let mut fields = Vec::with_capacity(self.columns.len());
        for (def, column) in self.schema.columns().iter().zip(self.columns.iter_mut()) {
            match column.read_value(id)? {
                SlotValue::Live(value) => fields.push((def.name.clone(), value)),
                SlotValue::Tombstone => return Err(SlotError::NotFound(id)),
            }
        }
        Ok(Row { id, fields })
    }

    fn live_count(&self) -> Result<u64> {
        let mut live = 0;
        for item in self.columns[0].scan(self.chunk_slots())? {
            let (_, slot) = item?;
            if !codec::is_tombstone(&slot) {
                live += 1;
            }
        }
        Ok(live)
    }

    fn verify(&self) -> Result<TableStats> {
        let mut live_rows = 0;
        for (position, (def, column)) in self.schema.columns().iter().zip(&self.columns).enumerate() {
            for item in column.scan(self.chunk_slots())? {
                let (index, slot) = item?;
                let value = codec::decode(&slot)
                    .map_err(|e| e.context(format!("column '{}' row {}", def.name, index)))?;
                if position == 0 && !value.is_tombstone() {
                    live_rows += 1;
                }
            }
        }

        Ok(TableStats {
            rows: self.row_count(),
            live_rows,
            columns: self.columns.len(),
            generation: self.schema.generation(),
        })
    }

    // =========================================================================
    // Schema Evolution
    // =========================================================================

    fn add_column(&mut self, name: &str, capacity: usize, default_value: &str) -> Result<()> {
        let mut schema = self.schema.clone();
        let def = schema.push_column(name, capacity)?.clone();
        let default_slot = self.encode(default_value, capacity)?;
        let tombstone = codec::tombstone(capacity);

        // Rows already deleted stay deleted in the new column too
        let authority = self.columns[0].scan(self.chunk_slots())?;
        let slots = authority.map(|item| {
            item.map(|(_, slot)| {
                if codec::is_tombstone(&slot) {
                    tombstone.clone()
                } else {
                    default_slot.clone()
                }
            })
        });
        let column = ColumnFile::build(
            &self.dir.join(def.file_name()),
            capacity,
            self.config.sync_strategy,
            slots,
        )?;

        self.install_schema(schema)?;
        self.columns.push(column);
        self.sweep_orphans()?;
        Ok(())
    }

    /// Returns false when the column already has that capacity
    fn resize_column(&mut self, name: &str, capacity: usize) -> Result<bool> {
        let index = self
            .schema
            .position(name)
            .ok_or_else(|| SlotError::ColumnNotFound(name.to_string()))?;
        if capacity == 0 {
            return Err(SlotError::InvalidSchema(format!(
                "column '{}' needs a positive capacity",
                name
            )));
        }
        if self.columns[index].capacity() == capacity {
            return Ok(false);
        }

        let mut schema = self.schema.clone();
        let def = schema.replace_file(index, capacity);
        let policy = self.config.overflow_policy;
        let tombstone = codec::tombstone(capacity);

        let scanner = self.columns[index].scan(self.chunk_slots())?;
        let slots = scanner.map(|item| {
            let (_, slot) = item?;
            match codec::decode(&slot)? {
                SlotValue::Tombstone => Ok(tombstone.clone()),
                SlotValue::Live(value) => encode_with(policy, &value, capacity),
            }
        });
        let column = ColumnFile::build(
            &self.dir.join(def.file_name()),
            capacity,
            self.config.sync_strategy,
            slots,
        )?;

        self.install_schema(schema)?;
        self.columns[index] = column;
        self.sweep_orphans()?;
        Ok(true)
    }
}

fn open_column(dir: &Path, def: &ColumnDef, config: &Config) -> Result<ColumnFile> {
    let path = dir.join(def.file_name());
    ColumnFile::open(&path, def.capacity, config.sync_strategy).map_err(|e| {
        if is_not_found(&e) {
            SlotError::Corruption(format!(
                "file {} for column '{}' is missing",
                path.display(),
                def.name
            ))
        } else {
            e
        }
    })
}

pub(super) fn encode_with(policy: OverflowPolicy, value: &str, capacity: usize) -> Result<Bytes> {
    match policy {
        OverflowPolicy::Reject => codec::encode(value, capacity),
        OverflowPolicy::Truncate => codec::encode_truncated(value, capacity),
    }
}
