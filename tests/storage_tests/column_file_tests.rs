//! Tests for ColumnFile
//!
//! These tests verify:
//! - Append and positional read
//! - In-place overwrite leaves neighbouring slots untouched
//! - Bounded-buffer scans
//! - Atomic rewrites
//! - Row count derivation and corruption detection

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use bytes::Bytes;
use slotdb::codec::{self, SlotLayout, SlotValue};
use slotdb::config::SyncStrategy;
use slotdb::storage::{ColumnFile, SlotWriter};
use slotdb::SlotError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_column(capacity: usize) -> (TempDir, PathBuf, ColumnFile) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("col_000001.slot");
    let column = ColumnFile::create(&path, capacity, SyncStrategy::EveryWrite).unwrap();
    (temp_dir, path, column)
}

fn append_values(column: &mut ColumnFile, values: &[&str]) {
    for value in values {
        let slot = codec::encode(value, column.capacity()).unwrap();
        column.append_slot(&slot).unwrap();
    }
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_create_empty_column() {
    let (_temp, path, column) = setup_column(8);

    assert_eq!(column.row_count(), 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn test_create_fails_if_exists() {
    let (_temp, path, _column) = setup_column(8);

    assert!(ColumnFile::create(&path, 8, SyncStrategy::EveryWrite).is_err());
}

#[test]
fn test_append_and_read() {
    let (_temp, _path, mut column) = setup_column(8);

    append_values(&mut column, &["alpha", "beta", "gamma"]);

    assert_eq!(column.row_count(), 3);
    assert_eq!(column.read_value(0).unwrap(), SlotValue::Live("alpha".into()));
    assert_eq!(column.read_value(2).unwrap(), SlotValue::Live("gamma".into()));
}

#[test]
fn test_file_length_is_rows_times_width() {
    let (_temp, path, mut column) = setup_column(50);

    append_values(&mut column, &["a", "b", "c", "d"]);

    assert_eq!(fs::metadata(&path).unwrap().len(), 4 * 51);
}

#[test]
fn test_read_out_of_range() {
    let (_temp, _path, mut column) = setup_column(4);
    append_values(&mut column, &["x"]);

    let result = column.read_slot(1);

    assert!(matches!(
        result,
        Err(SlotError::OutOfRange { index: 1, row_count: 1 })
    ));
}

// =============================================================================
// In-place Write Tests
// =============================================================================

#[test]
fn test_write_slot_overwrites_only_target() {
    let (_temp, path, mut column) = setup_column(6);
    append_values(&mut column, &["one", "two", "three"]);
    let before = fs::read(&path).unwrap();

    let slot = codec::encode("TWO!", 6).unwrap();
    column.write_slot(1, &slot).unwrap();

    let after = fs::read(&path).unwrap();
    assert_eq!(before.len(), after.len());
    assert_eq!(before[..7], after[..7]);
    assert_eq!(before[14..], after[14..]);
    assert_eq!(column.read_value(1).unwrap().as_str(), Some("TWO!"));
}

#[test]
fn test_write_slot_rejects_wrong_width() {
    let (_temp, _path, mut column) = setup_column(6);
    append_values(&mut column, &["one"]);

    let slot = codec::encode("one", 5).unwrap();

    assert!(matches!(
        column.write_slot(0, &slot),
        Err(SlotError::InvalidArgument(_))
    ));
}

#[test]
fn test_write_slot_out_of_range_does_not_grow() {
    let (_temp, path, mut column) = setup_column(3);
    append_values(&mut column, &["a"]);

    let slot = codec::encode("b", 3).unwrap();
    assert!(column.write_slot(5, &slot).is_err());

    assert_eq!(fs::metadata(&path).unwrap().len(), 4);
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_scan_yields_every_slot_in_order() {
    let (_temp, _path, mut column) = setup_column(4);
    let values: Vec<String> = (0..10).map(|i| format!("v{}", i)).collect();
    let refs: Vec<&str> = values.iter().map(String::as_str).collect();
    append_values(&mut column, &refs);

    // Chunk smaller than the file, and not a divisor of it
    let scanned: Vec<(u64, String)> = column
        .scan(3)
        .unwrap()
        .map(|item| {
            let (index, slot) = item.unwrap();
            (index, codec::decode(&slot).unwrap().into_live().unwrap())
        })
        .collect();

    assert_eq!(scanned.len(), 10);
    for (i, (index, value)) in scanned.iter().enumerate() {
        assert_eq!(*index, i as u64);
        assert_eq!(value, &values[i]);
    }
}

#[test]
fn test_scan_rewind() {
    let (_temp, _path, mut column) = setup_column(4);
    append_values(&mut column, &["a", "b"]);

    let mut scanner = column.scan(1).unwrap();
    assert_eq!(scanner.next().unwrap().unwrap().0, 0);
    scanner.rewind().unwrap();

    assert_eq!(scanner.count(), 2);
}

#[test]
fn test_scan_empty_column() {
    let (_temp, _path, column) = setup_column(4);

    assert_eq!(column.scan(16).unwrap().count(), 0);
}

// =============================================================================
// Rewrite Tests
// =============================================================================

#[test]
fn test_build_writes_all_slots() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("built.slot");
    let slots = ["a", "bb", "ccc"]
        .iter()
        .map(|v| codec::encode(v, 3));

    let column = ColumnFile::build(&path, 3, SyncStrategy::OsManaged, slots).unwrap();

    assert_eq!(column.row_count(), 3);
    assert!(!temp_dir.path().join("built.slot.tmp").exists());
}

#[test]
fn test_truncate_and_rewrite_replaces_contents() {
    let (_temp, path, mut column) = setup_column(4);
    append_values(&mut column, &["a", "b", "c", "d"]);

    let kept: Vec<Bytes> = vec![codec::encode("b", 4).unwrap(), codec::encode("d", 4).unwrap()];
    let rows = column.truncate_and_rewrite(kept.into_iter().map(Ok)).unwrap();

    assert_eq!(rows, 2);
    assert_eq!(fs::metadata(&path).unwrap().len(), 10);
    assert_eq!(column.read_value(1).unwrap().as_str(), Some("d"));
}

#[test]
fn test_failed_rewrite_keeps_original() {
    let (_temp, path, mut column) = setup_column(4);
    append_values(&mut column, &["a", "b"]);

    let slots = vec![
        Ok(codec::encode("x", 4).unwrap()),
        Err(SlotError::InvalidArgument("boom".into())),
    ];
    assert!(column.truncate_and_rewrite(slots).is_err());

    let reopened = ColumnFile::open(&path, 4, SyncStrategy::EveryWrite).unwrap();
    assert_eq!(reopened.row_count(), 2);
    assert!(!path.with_file_name("col_000001.slot.tmp").exists());
}

#[test]
fn test_abandoned_writer_removes_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("col.slot");

    {
        let mut writer = SlotWriter::new(&path, SlotLayout::new(2)).unwrap();
        writer.push(&codec::encode("hi", 2).unwrap()).unwrap();
        assert_eq!(writer.row_count(), 1);
    }

    assert!(!path.exists());
    assert!(!temp_dir.path().join("col.slot.tmp").exists());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_open_rejects_partial_slot() {
    let (_temp, path, mut column) = setup_column(4);
    append_values(&mut column, &["a"]);
    drop(column);

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"xy").unwrap();

    match ColumnFile::open(&path, 4, SyncStrategy::EveryWrite) {
        Err(e @ SlotError::Corruption(_)) => {
            let message = e.to_string();
            assert!(message.contains("col_000001.slot"));
            assert_eq!(message.matches("corruption detected").count(), 1);
        }
        other => panic!("expected Corruption, got {:?}", other),
    }
}

// =============================================================================
// Truncate Tests
// =============================================================================

#[test]
fn test_truncate_to_drops_tail() {
    let (_temp, path, mut column) = setup_column(4);
    append_values(&mut column, &["a", "b", "c"]);

    column.truncate_to(1).unwrap();

    assert_eq!(column.row_count(), 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), 5);
    assert_eq!(column.read_value(0).unwrap().as_str(), Some("a"));
    assert!(column.read_slot(1).is_err());
}

#[test]
fn test_truncate_to_cannot_grow() {
    let (_temp, _path, mut column) = setup_column(4);
    append_values(&mut column, &["a"]);

    let result = column.truncate_to(2);

    assert!(matches!(
        result,
        Err(SlotError::OutOfRange { index: 2, row_count: 1 })
    ));
    assert_eq!(column.row_count(), 1);
}

#[test]
fn test_append_after_truncate_reuses_position() {
    let (_temp, _path, mut column) = setup_column(4);
    append_values(&mut column, &["a", "b"]);
    column.truncate_to(1).unwrap();

    let index = column.append_slot(&codec::encode("z", 4).unwrap()).unwrap();

    assert_eq!(index, 1);
    assert_eq!(column.read_value(1).unwrap().as_str(), Some("z"));
}

#[test]
fn test_refresh_sees_appends_from_other_handle() {
    let (_temp, path, mut column) = setup_column(4);
    let mut other = ColumnFile::open(&path, 4, SyncStrategy::EveryWrite).unwrap();

    append_values(&mut other, &["a", "b"]);
    assert_eq!(column.row_count(), 0);

    assert_eq!(column.refresh().unwrap(), 2);
    assert_eq!(column.read_value(1).unwrap().as_str(), Some("b"));
}
