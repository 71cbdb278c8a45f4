//! Search and pagination

use crate::codec::{self, SlotValue};
use crate::error::{Result, SlotError};

use super::table::OpenTable;
use super::Record;

/// Comparison flags for [`Table::find`](super::Table::find)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Compare after Unicode lowercasing both sides
    pub case_insensitive: bool,
    /// Match when the pattern occurs anywhere in the value
    pub partial_match: bool,
}

impl FindOptions {
    /// Exact, case-sensitive comparison
    pub fn exact() -> Self {
        Self::default()
    }

    pub fn case_insensitive(mut self, on: bool) -> Self {
        self.case_insensitive = on;
        self
    }

    pub fn partial_match(mut self, on: bool) -> Self {
        self.partial_match = on;
        self
    }
}

/// One predicate field, normalized once up front
struct Matcher {
    pattern: String,
    options: FindOptions,
}

impl Matcher {
    fn new(pattern: &str, options: FindOptions) -> Self {
        let pattern = if options.case_insensitive {
            pattern.to_lowercase()
        } else {
            pattern.to_string()
        };
        Self { pattern, options }
    }

    fn matches(&self, value: &str) -> bool {
        let lowered;
        let value = if self.options.case_insensitive {
            lowered = value.to_lowercase();
            lowered.as_str()
        } else {
            value
        };

        if self.options.partial_match {
            value.contains(self.pattern.as_str())
        } else {
            value == self.pattern
        }
    }
}

impl OpenTable {
    /// Scan the predicate's columns in lockstep; a row matches when it is
    /// live and every field matches. An empty predicate matches every live row.
    ///
    /// The first column is always scanned for tombstones: `delete` marks it
    /// first, so a delete torn by a crash still hides the row here as it
    /// does in `get`.
    pub(super) fn find(&self, predicate: &Record, options: FindOptions) -> Result<Vec<u64>> {
        let mut scanners = Vec::with_capacity(predicate.len() + 1);
        let mut matchers = Vec::with_capacity(predicate.len());
        let mut scans_first = false;

        for (field, pattern) in predicate {
            let index = self
                .schema
                .position(field)
                .ok_or_else(|| SlotError::ColumnNotFound(field.clone()))?;
            scans_first |= index == 0;
            scanners.push(self.columns[index].scan(self.chunk_slots())?);
            matchers.push(Matcher::new(pattern, options));
        }
        // No matcher at this position: liveness only
        if !scans_first {
            scanners.push(self.columns[0].scan(self.chunk_slots())?);
        }

        let mut ids = Vec::new();
        for id in 0..self.row_count() {
            let mut matched = true;
            for (position, scanner) in scanners.iter_mut().enumerate() {
                let (_, slot) = scanner.next().ok_or_else(|| {
                    SlotError::Corruption(format!("column scan ended before row {}", id))
                })??;
                // Keep every scanner advancing even after a miss
                if !matched {
                    continue;
                }
                matched = match codec::decode(&slot)? {
                    SlotValue::Tombstone => false,
                    SlotValue::Live(value) => matchers
                        .get(position)
                        .map_or(true, |matcher| matcher.matches(&value)),
                };
            }
            if matched {
                ids.push(id);
            }
        }

        tracing::trace!(
            "find over {} columns of {} matched {} rows",
            predicate.len(),
            self.dir.display(),
            ids.len()
        );
        Ok(ids)
    }
}

/// Page `page_number` (1-based) of `page_size` ids.
///
/// Both arguments must be positive. A page past the end is empty.
pub fn paginate(ids: &[u64], page_size: usize, page_number: usize) -> Result<Vec<u64>> {
    if page_size == 0 || page_number == 0 {
        return Err(SlotError::InvalidArgument(format!(
            "page size and page number must be positive (got size {}, page {})",
            page_size, page_number
        )));
    }

    let start = (page_number - 1).saturating_mul(page_size);
    if start >= ids.len() {
        return Ok(Vec::new());
    }
    let end = start.saturating_add(page_size).min(ids.len());
    Ok(ids[start..end].to_vec())
}
