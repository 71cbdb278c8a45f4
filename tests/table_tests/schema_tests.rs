//! Tests for schema evolution
//!
//! These tests verify:
//! - add_column backfills existing rows (and keeps tombstones)
//! - rename_column touches only the descriptor
//! - resize_column re-pads every row
//! - Schema changes are visible to other handles

use std::fs;

use slotdb::table::SCHEMA_FILE;
use slotdb::{record, Engine, FindOptions, Schema, SlotError, Table};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_users() -> (TempDir, Engine, Table) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open_path(temp_dir.path()).unwrap();
    let users = engine
        .create_table("users", &[("name", 50), ("email", 100)])
        .unwrap();
    users
        .create(&record([("name", "Alice"), ("email", "a@x.com")]))
        .unwrap();
    users
        .create(&record([("name", "Bob"), ("email", "b@x.com")]))
        .unwrap();
    (temp_dir, engine, users)
}

fn slot_files(table: &Table) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(table.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".slot"))
        .collect();
    names.sort();
    names
}

// =============================================================================
// Schema Value Tests
// =============================================================================

#[test]
fn test_schema_rejects_empty() {
    assert!(matches!(Schema::new(&[]), Err(SlotError::InvalidSchema(_))));
}

#[test]
fn test_schema_rejects_duplicate_names() {
    let result = Schema::new(&[("name", 10), ("name", 20)]);

    assert!(matches!(result, Err(SlotError::InvalidSchema(_))));
}

#[test]
fn test_schema_rejects_zero_capacity() {
    assert!(matches!(
        Schema::new(&[("name", 0)]),
        Err(SlotError::InvalidSchema(_))
    ));
}

#[test]
fn test_schema_preserves_column_order() {
    let schema = Schema::new(&[("b", 1), ("a", 2), ("c", 3)]).unwrap();

    assert_eq!(schema.names().collect::<Vec<_>>(), vec!["b", "a", "c"]);
    assert_eq!(schema.capacity("a").unwrap(), 2);
    assert!(matches!(schema.capacity("z"), Err(SlotError::ColumnNotFound(_))));
}

#[test]
fn test_corrupt_descriptor_is_reported() {
    let (_temp, engine, users) = setup_users();
    let path = users.path().join(SCHEMA_FILE);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let result = engine.open("users");

    assert!(matches!(result, Err(SlotError::Corruption(_))));
}

// =============================================================================
// Add Column Tests
// =============================================================================

#[test]
fn test_add_column_backfills_empty_values() {
    let (_temp, _engine, users) = setup_users();

    users.add_column("phone", 20, "").unwrap();

    let phone = users.path().join(users.schema().unwrap().column("phone").unwrap().file_name());
    assert_eq!(fs::metadata(&phone).unwrap().len(), 2 * 21);
    for row in users.get(&[0, 1]).unwrap() {
        assert_eq!(row.get("phone"), Some(""));
    }
}

#[test]
fn test_add_column_with_default() {
    let (_temp, _engine, users) = setup_users();

    users.add_column("status", 8, "active").unwrap();

    let ids = users
        .find(&record([("status", "active")]), FindOptions::exact())
        .unwrap();
    assert_eq!(ids, vec![0, 1]);
}

#[test]
fn test_add_column_keeps_deleted_rows_deleted() {
    let (_temp, _engine, users) = setup_users();
    users.delete(&[0]).unwrap();

    users.add_column("phone", 20, "n/a").unwrap();

    assert!(matches!(users.get(&[0]), Err(SlotError::NotFound(0))));
    assert_eq!(users.verify().unwrap().live_rows, 1);
    assert_eq!(users.get(&[1]).unwrap()[0].get("phone"), Some("n/a"));
}

#[test]
fn test_add_duplicate_column() {
    let (_temp, _engine, users) = setup_users();

    let result = users.add_column("name", 10, "");

    assert!(matches!(result, Err(SlotError::DuplicateColumn(_))));
}

#[test]
fn test_add_column_default_too_long() {
    let (_temp, _engine, users) = setup_users();

    let result = users.add_column("code", 2, "toolong");

    assert!(matches!(result, Err(SlotError::ValueTooLong { .. })));
    assert!(users.schema().unwrap().position("code").is_none());
    assert_eq!(slot_files(&users).len(), 2);
}

#[test]
fn test_new_rows_after_add_column() {
    let (_temp, _engine, users) = setup_users();
    users.add_column("phone", 20, "").unwrap();

    let id = users
        .create(&record([("name", "Carol"), ("phone", "555-0100")]))
        .unwrap();

    assert_eq!(id, 2);
    assert_eq!(users.get(&[2]).unwrap()[0].get("phone"), Some("555-0100"));
}

// =============================================================================
// Rename Column Tests
// =============================================================================

#[test]
fn test_rename_column_keeps_data_and_files() {
    let (_temp, _engine, users) = setup_users();
    let files_before = slot_files(&users);

    users.rename_column("email", "mail").unwrap();

    assert_eq!(slot_files(&users), files_before);
    assert_eq!(users.get(&[0]).unwrap()[0].get("mail"), Some("a@x.com"));
    assert_eq!(users.get(&[0]).unwrap()[0].get("email"), None);
}

#[test]
fn test_rename_to_existing_name() {
    let (_temp, _engine, users) = setup_users();

    let result = users.rename_column("email", "name");

    assert!(matches!(result, Err(SlotError::DuplicateColumn(_))));
}

#[test]
fn test_rename_missing_column() {
    let (_temp, _engine, users) = setup_users();

    let result = users.rename_column("phone", "tel");

    assert!(matches!(result, Err(SlotError::ColumnNotFound(_))));
}

// =============================================================================
// Resize Column Tests
// =============================================================================

#[test]
fn test_resize_column_grows() {
    let (_temp, _engine, users) = setup_users();

    users.resize_column("name", 80).unwrap();

    assert_eq!(users.schema().unwrap().capacity("name").unwrap(), 80);
    let long = "n".repeat(80);
    users.update(&[0], &record([("name", long.as_str())])).unwrap();
    assert_eq!(users.get(&[0]).unwrap()[0].get("name"), Some(long.as_str()));
    assert_eq!(users.get(&[1]).unwrap()[0].get("name"), Some("Bob"));
}

#[test]
fn test_resize_column_shrink_rejects_overflow() {
    let (_temp, _engine, users) = setup_users();
    let files_before = slot_files(&users);

    let result = users.resize_column("email", 3);

    assert!(matches!(result, Err(SlotError::ValueTooLong { .. })));
    assert_eq!(users.schema().unwrap().capacity("email").unwrap(), 100);
    assert_eq!(slot_files(&users), files_before);
}

#[test]
fn test_resize_removes_old_file() {
    let (_temp, _engine, users) = setup_users();

    users.resize_column("email", 30).unwrap();

    assert_eq!(slot_files(&users).len(), 2);
    users.verify().unwrap();
}

// =============================================================================
// Cross-handle Tests
// =============================================================================

#[test]
fn test_other_handle_sees_schema_change() {
    let (_temp, engine, users) = setup_users();
    let other = engine.open("users").unwrap();

    users.add_column("phone", 12, "").unwrap();
    users.rename_column("name", "full_name").unwrap();

    let row = other.get(&[1]).unwrap().remove(0);
    assert_eq!(row.get("full_name"), Some("Bob"));
    assert_eq!(row.get("phone"), Some(""));
    assert!(other.schema().unwrap().generation() >= 2);
}
