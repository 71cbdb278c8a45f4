//! Engine Module
//!
//! Top-level handle: resolves table names under a storage root.
//!
//! ## Responsibilities
//! - Own the configuration and the lock manager shared by every table
//! - Create tables (descriptor + empty column files)
//! - Hand out `Table` handles and close them
//!
//! Every call takes an explicit `Table`; there is no "current table" state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::config::Config;
use crate::error::{Result, SlotError};
use crate::lock::{FileLockManager, LockManager, LockMode};
use crate::storage::ColumnFile;
use crate::table::{is_not_found, schema_exists, Schema, Table};

/// Entry point for all table access
pub struct Engine {
    /// Engine configuration (shared with every table handle)
    config: Arc<Config>,

    /// Table lock implementation
    locks: Arc<dyn LockManager>,
}

impl Engine {
    /// Open an engine over `config.data_dir`, creating it if needed.
    ///
    /// Tables are locked with OS advisory file locks.
    pub fn new(config: Config) -> Result<Self> {
        let locks = Arc::new(FileLockManager::new(&config));
        Self::with_lock_manager(config, locks)
    }

    /// Open an engine with a caller-supplied lock manager
    pub fn with_lock_manager(config: Config, locks: Arc<dyn LockManager>) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        tracing::debug!("Engine ready at {}", config.data_dir.display());
        Ok(Self {
            config: Arc::new(config),
            locks,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::new(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Create a table with `(column, capacity)` pairs in column order
    pub fn create_table(&self, name: &str, columns: &[(&str, usize)]) -> Result<Table> {
        let dir = self.table_dir(name)?;
        let schema = Schema::new(columns)?;
        if schema_exists(&dir) {
            return Err(SlotError::TableExists(name.to_string()));
        }

        fs::create_dir_all(&dir)?;
        {
            let _guard = self.locks.acquire(&dir, LockMode::Exclusive)?;
            // Lost a race with another creator
            if schema_exists(&dir) {
                return Err(SlotError::TableExists(name.to_string()));
            }

            // Column files first: the table only exists once schema.bin does
            for def in schema.columns() {
                ColumnFile::build(
                    &dir.join(def.file_name()),
                    def.capacity,
                    self.config.sync_strategy,
                    std::iter::empty::<Result<Bytes>>(),
                )?;
            }
            schema.persist(&dir)?;
        }

        tracing::info!(
            "Created table '{}' with columns [{}]",
            name,
            schema.names().collect::<Vec<_>>().join(", ")
        );
        self.open(name)
    }

    /// Resolve and open a table
    pub fn open(&self, name: &str) -> Result<Table> {
        let table = self.table(name)?;
        table.open()?;
        Ok(table)
    }

    /// Resolve a table without touching it; it opens on first use
    pub fn table(&self, name: &str) -> Result<Table> {
        let dir = self.table_dir(name)?;
        Ok(Table::new(
            name,
            dir,
            Arc::clone(&self.config),
            Arc::clone(&self.locks),
        ))
    }

    /// Close a handle. Consumes it; other handles are unaffected.
    pub fn close(&self, table: Table) {
        table.close();
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.table_dir(name).map(|dir| schema_exists(&dir)).unwrap_or(false)
    }

    /// Names of every table under the storage root, sorted
    pub fn table_names(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.config.data_dir) {
            Ok(entries) => entries,
            Err(e) => {
                let e = SlotError::from(e);
                return if is_not_found(&e) { Ok(Vec::new()) } else { Err(e) };
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() && schema_exists(&path) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the storage root
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Directory for a table name; names must stay inside the storage root
    fn table_dir(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\']);
        if !valid {
            return Err(SlotError::InvalidArgument(format!(
                "invalid table name '{}'",
                name
            )));
        }
        Ok(self.config.data_dir.join(name))
    }
}
