//! Codec Module
//!
//! Encodes values into fixed-width slots and back.
//!
//! ## Responsibilities
//! - Pad values to the column capacity with a filler byte
//! - Reject (or truncate) values that do not fit
//! - Mark deleted rows with a tombstone slot
//! - Define row geometry: slot width and byte offsets
//!
//! ## Slot Format
//! ```text
//! ┌─────────────────────────────────────────┬──────────────┐
//! │ Content (capacity bytes)                │ Terminator   │
//! │ value bytes, right-padded with 0x00     │ (1 byte)     │
//! └─────────────────────────────────────────┴──────────────┘
//!
//! live row:   "Alice" 00 00 00 ... 00 | 0x0A
//! empty row:  00 00 00 00 00 ... 00   | 0x0A
//! tombstone:  00 00 00 00 00 ... 00   | 0x7F
//! ```
//!
//! Because the width never changes, row `i` of a column starts at byte
//! `i * (capacity + 1)`. Decoding never searches for the terminator, so the
//! terminator byte is legal inside a value. The filler byte is not: trailing
//! filler is stripped on decode, so values containing `0x00` are rejected.

mod layout;
mod slot;

pub use layout::SlotLayout;
pub use slot::{decode, encode, encode_truncated, is_tombstone, tombstone, SlotValue};

/// Padding byte for unused content bytes
pub const FILLER: u8 = 0x00;

/// Last byte of every live slot
pub const TERMINATOR: u8 = b'\n';

/// Last byte of a tombstoned slot
pub const TOMBSTONE_TERMINATOR: u8 = 0x7F;
