//! Table Module
//!
//! A schema plus one column file per column, addressed by row ordinal.
//!
//! ## Responsibilities
//! - Row CRUD: append, positional read, in-place update, tombstone delete
//! - Predicate search over only the referenced columns
//! - Schema evolution: add, rename, resize columns
//! - Compaction of tombstoned rows (`optimise`)
//!
//! ## Alignment Invariant
//! Slot `i` of every column file belongs to the same record. Every column
//! file therefore has the same row count; a mismatch is `Corruption`.
//!
//! ## Lock Discipline
//! Reads (`find`, `get`, counts) take a shared lock; everything that writes
//! a byte takes an exclusive lock. The lock is held for the whole call and
//! released on every exit path.
//!
//! ## Directory Layout
//! ```text
//! {table}/
//!   ├── schema.bin          descriptor (see `schema`)
//!   ├── col_000001.slot     column files, named by stable file id
//!   ├── col_000002.slot
//!   ├── .lock / .lock.owner
//!   └── backups/{unix_ms}/  snapshots taken by optimise(true)
//! ```

mod compaction;
mod query;
mod schema;
#[allow(clippy::module_inception)]
mod table;

use std::collections::BTreeMap;

pub use compaction::{OptimiseReport, BACKUP_DIR};
pub use query::{paginate, FindOptions};
pub use schema::{ColumnDef, Schema, SCHEMA_FILE};
pub use table::{Table, TableStats};

pub(crate) use schema::{is_not_found, schema_exists};

/// Field name → value mapping used for inserts, updates and predicates
pub type Record = BTreeMap<String, String>;

/// Build a [`Record`] from `(field, value)` pairs
pub fn record<I, K, V>(pairs: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A full record read back from a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Ordinal position, shared by every column file
    pub id: u64,
    /// Values in schema order
    pub fields: Vec<(String, String)>,
}

impl Row {
    /// Value of a column
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn into_record(self) -> Record {
        self.fields.into_iter().collect()
    }
}
