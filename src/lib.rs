//! # slotdb
//!
//! A file-backed columnar record store with:
//! - One fixed-width slot file per column, O(1) positional addressing
//! - In-place updates that never move a row
//! - Tombstone deletes with deferred compaction (`optimise`)
//! - Table-level shared/exclusive locks that hold across processes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │              (storage root → Table handles)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                          Table                               │
//! │        (schema, CRUD, find, schema changes, optimise)        │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐              ┌─────────────────────┐
//!   │  Lock Manager   │              │   Column File [ ]   │
//!   │ (shared/excl.)  │              │  (slot i at i*(c+1))│
//!   └─────────────────┘              └──────────┬──────────┘
//!                                               │
//!                                               ▼
//!                                     ┌─────────────────┐
//!                                     │      Codec      │
//!                                     │ (pad/tombstone) │
//!                                     └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use slotdb::{record, Engine, FindOptions};
//!
//! # fn main() -> slotdb::Result<()> {
//! let engine = Engine::open_path("./data".as_ref())?;
//! let users = engine.create_table("users", &[("name", 50), ("email", 100)])?;
//!
//! let id = users.create(&record([("name", "Alice"), ("email", "a@x.com")]))?;
//! let hits = users.find(
//!     &record([("name", "alice")]),
//!     FindOptions::exact().case_insensitive(true),
//! )?;
//! assert_eq!(hits, vec![id]);
//!
//! users.delete(&[id])?;
//! users.optimise(false)?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod storage;
pub mod lock;
pub mod table;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, SlotError};
pub use config::Config;
pub use engine::Engine;
pub use lock::{FileLockManager, LockManager, LockMode, MemoryLockManager};
pub use table::{paginate, record, FindOptions, OptimiseReport, Record, Row, Schema, Table};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of slotdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
