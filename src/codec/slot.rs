//! Slot encoding and decoding

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, SlotError};

use super::{FILLER, TERMINATOR, TOMBSTONE_TERMINATOR};

/// A decoded slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    /// A live value with padding stripped
    Live(String),

    /// The row was deleted
    Tombstone,
}

impl SlotValue {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, SlotValue::Tombstone)
    }

    /// The live value, or `None` for a tombstone
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SlotValue::Live(v) => Some(v),
            SlotValue::Tombstone => None,
        }
    }

    pub fn into_live(self) -> Option<String> {
        match self {
            SlotValue::Live(v) => Some(v),
            SlotValue::Tombstone => None,
        }
    }
}

/// Encode `value` into a `capacity + 1` byte slot.
///
/// Fails with `ValueTooLong` when the value does not fit and with
/// `ReservedByte` when it contains the filler byte.
pub fn encode(value: &str, capacity: usize) -> Result<Bytes> {
    let bytes = value.as_bytes();
    if bytes.len() > capacity {
        return Err(SlotError::ValueTooLong {
            len: bytes.len(),
            capacity,
        });
    }
    write_slot(bytes, capacity)
}

/// Encode `value`, cutting it at the last UTF-8 boundary that fits.
pub fn encode_truncated(value: &str, capacity: usize) -> Result<Bytes> {
    let mut end = value.len().min(capacity);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    write_slot(&value.as_bytes()[..end], capacity)
}

/// The tombstone slot for a column of `capacity`
pub fn tombstone(capacity: usize) -> Bytes {
    let mut slot = BytesMut::with_capacity(capacity + 1);
    slot.put_bytes(FILLER, capacity);
    slot.put_u8(TOMBSTONE_TERMINATOR);
    slot.freeze()
}

/// Cheap tombstone check on a raw slot (looks only at the terminator)
pub fn is_tombstone(slot: &[u8]) -> bool {
    slot.last() == Some(&TOMBSTONE_TERMINATOR)
}

/// Decode a full slot (content + terminator).
pub fn decode(slot: &[u8]) -> Result<SlotValue> {
    let (terminator, content) = match slot.split_last() {
        Some(parts) => parts,
        None => {
            return Err(SlotError::Corruption("empty slot".to_string()));
        }
    };

    match *terminator {
        TOMBSTONE_TERMINATOR => Ok(SlotValue::Tombstone),
        TERMINATOR => {
            let end = content
                .iter()
                .rposition(|&b| b != FILLER)
                .map(|pos| pos + 1)
                .unwrap_or(0);
            let value = std::str::from_utf8(&content[..end]).map_err(|e| {
                SlotError::Corruption(format!("slot content is not UTF-8: {}", e))
            })?;
            Ok(SlotValue::Live(value.to_string()))
        }
        other => Err(SlotError::Corruption(format!(
            "unexpected slot terminator 0x{:02X}",
            other
        ))),
    }
}

fn write_slot(content: &[u8], capacity: usize) -> Result<Bytes> {
    if content.contains(&FILLER) {
        return Err(SlotError::ReservedByte);
    }
    let mut slot = BytesMut::with_capacity(capacity + 1);
    slot.put_slice(content);
    slot.put_bytes(FILLER, capacity - content.len());
    slot.put_u8(TERMINATOR);
    Ok(slot.freeze())
}
