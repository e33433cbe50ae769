//! Table CRUD Tests
//!
//! Tests for record visibility across the buffered views:
//! - Insert stamps `_id`, `_created`, `_modified`
//! - Update merges and preserves identity fields
//! - Delete hides a record wherever it lives (pending, resident, log)
//! - Re-insert of an existing id replaces the visible record

use std::sync::Arc;

use logdoc::{IdStrategy, ManualClock, Table, TableError, TableOptions};
use serde_json::{json, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open(dir: &TempDir, options: TableOptions) -> (Table, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let mut table = Table::with_clock(dir.path(), "people", options, clock.clone()).unwrap();
    table.load().unwrap();
    (table, clock)
}

fn reopen(dir: &TempDir, options: TableOptions) -> Table {
    let mut table = Table::open(dir.path(), "people", options).unwrap();
    table.load().unwrap();
    table
}

fn strip_meta(value: Value) -> Value {
    let mut value = value;
    if let Value::Object(map) = &mut value {
        map.remove("_id");
        map.remove("_created");
        map.remove("_modified");
    }
    value
}

// =============================================================================
// Insert / Get
// =============================================================================

/// Inserted record reads back with identity fields and equal timestamps.
#[test]
fn test_insert_then_get() {
    let dir = TempDir::new().unwrap();
    let (mut table, _) = open(&dir, TableOptions::manual());

    let record = json!({"name": "a", "age": 20, "tags": ["x", "y"], "address": {"city": "z"}});
    let inserted = table.insert(record.clone()).unwrap();
    let id = inserted.id().unwrap().to_string();

    let fetched = table.get(&id).unwrap().unwrap();
    assert_eq!(strip_meta(fetched.clone().into_value()), record);
    assert!(fetched.created().is_some());
    assert_eq!(fetched.created(), fetched.modified());
}

/// Caller-supplied ids are kept.
#[test]
fn test_insert_with_id() {
    let dir = TempDir::new().unwrap();
    let (mut table, _) = open(&dir, TableOptions::manual());

    table.insert(json!({"_id": "user-1", "name": "a"})).unwrap();
    let fetched = table.get("user-1").unwrap().unwrap();
    assert_eq!(fetched["name"], json!("a"));
}

/// insert_many validates every record before applying any.
#[test]
fn test_insert_many_all_or_nothing() {
    let dir = TempDir::new().unwrap();
    let (mut table, _) = open(&dir, TableOptions::manual());

    let err = table
        .insert_many(vec![json!({"_id": "a"}), json!("not an object")])
        .unwrap_err();
    assert!(matches!(err, TableError::InvalidDocument(_)));
    assert!(table.get("a").unwrap().is_none());

    let inserted = table
        .insert_many(vec![json!({"_id": "a"}), json!({"_id": "b"})])
        .unwrap();
    assert_eq!(inserted.len(), 2);
    assert_eq!(table.len().unwrap(), 2);
}

/// Auto-increment ids continue across reloads.
#[test]
fn test_auto_increment_survives_reload() {
    let dir = TempDir::new().unwrap();
    let options = TableOptions::manual().with_id_strategy(IdStrategy::AutoIncrement);
    let (mut table, _) = open(&dir, options.clone());

    table.insert(json!({"n": 1})).unwrap();
    table.insert(json!({"n": 2})).unwrap();
    table.close().unwrap();

    let mut table = reopen(&dir, options);
    let doc = table.insert(json!({"n": 3})).unwrap();
    assert_eq!(doc.id(), Some("3"));
}

// =============================================================================
// Update
// =============================================================================

/// Patch overrides named keys, keeps the rest, preserves `_created`.
#[test]
fn test_update_merges_patch() {
    let dir = TempDir::new().unwrap();
    let (mut table, clock) = open(&dir, TableOptions::manual());

    let before = table
        .insert(json!({"_id": "a", "name": "a", "age": 20}))
        .unwrap();
    clock.advance_ms(5);

    let after = table
        .update("a", json!({"age": 21, "city": "x", "_id": "hijack", "_created": "never"}))
        .unwrap()
        .unwrap();

    assert_eq!(after.id(), Some("a"));
    assert_eq!(after["name"], json!("a"));
    assert_eq!(after["age"], json!(21));
    assert_eq!(after["city"], json!("x"));
    assert_eq!(after.created(), before.created());
    assert!(after.modified() > before.modified());
    assert_eq!(table.get("a").unwrap().unwrap(), after);
}

/// Non-object patches are rejected.
#[test]
fn test_update_rejects_non_object_patch() {
    let dir = TempDir::new().unwrap();
    let (mut table, _) = open(&dir, TableOptions::manual());
    table.insert(json!({"_id": "a"})).unwrap();

    assert!(matches!(
        table.update("a", json!(5)),
        Err(TableError::InvalidDocument(_))
    ));
}

/// update_many touches exactly the matching records.
#[test]
fn test_update_many() {
    let dir = TempDir::new().unwrap();
    let (mut table, _) = open(&dir, TableOptions::manual());
    for (id, age) in [("a", 20), ("b", 30), ("c", 40)] {
        table.insert(json!({"_id": id, "age": age})).unwrap();
    }

    let updated = table
        .update_many(json!({"age": {"$gte": 30}}), json!({"senior": true}))
        .unwrap();
    assert_eq!(updated, 2);
    assert_eq!(table.count(json!({"senior": true})).unwrap(), 2);
    assert!(!table.get("a").unwrap().unwrap().contains("senior"));
}

// =============================================================================
// Delete
// =============================================================================

/// Delete hides the record and drops the count by one.
#[test]
fn test_delete_then_get() {
    let dir = TempDir::new().unwrap();
    let (mut table, _) = open(&dir, TableOptions::manual());
    table.insert(json!({"_id": "a"})).unwrap();
    table.insert(json!({"_id": "b"})).unwrap();
    table.flush().unwrap();

    let before = table.len().unwrap();
    assert!(table.delete("a").unwrap());
    assert!(table.get("a").unwrap().is_none());
    assert_eq!(table.len().unwrap(), before - 1);
    assert!(!table.delete("a").unwrap());
}

/// delete_many removes matching records only.
#[test]
fn test_delete_many() {
    let dir = TempDir::new().unwrap();
    let (mut table, _) = open(&dir, TableOptions::manual());
    for (id, role) in [("a", "admin"), ("b", "user"), ("c", "user")] {
        table.insert(json!({"_id": id, "role": role})).unwrap();
    }

    assert_eq!(table.delete_many(json!({"role": "user"})).unwrap(), 2);
    let remaining: Vec<String> = table
        .all()
        .unwrap()
        .iter()
        .map(|d| d.id().unwrap().to_string())
        .collect();
    assert_eq!(remaining, vec!["a"]);
}

/// A deleted id can be inserted again.
#[test]
fn test_reinsert_after_delete() {
    let dir = TempDir::new().unwrap();
    let (mut table, _) = open(&dir, TableOptions::manual());
    table.insert(json!({"_id": "a", "v": 1})).unwrap();
    table.flush().unwrap();
    table.delete("a").unwrap();

    table.insert(json!({"_id": "a", "v": 2})).unwrap();
    assert_eq!(table.get("a").unwrap().unwrap()["v"], json!(2));

    table.close().unwrap();
    let mut table = reopen(&dir, TableOptions::manual());
    assert_eq!(table.get("a").unwrap().unwrap()["v"], json!(2));
    assert_eq!(table.len().unwrap(), 1);
}

// =============================================================================
// Overwrite
// =============================================================================

/// Re-inserting an id replaces the visible record, before and after reload.
#[test]
fn test_reinsert_overwrites() {
    let dir = TempDir::new().unwrap();
    let (mut table, _) = open(&dir, TableOptions::manual());

    table.insert(json!({"_id": "a", "v": 1})).unwrap();
    table.flush().unwrap();
    table.insert(json!({"_id": "a", "v": 2})).unwrap();
    table.flush().unwrap();

    assert_eq!(table.get("a").unwrap().unwrap()["v"], json!(2));
    assert_eq!(table.len().unwrap(), 1);

    // Duplicate lines are on disk; only the latest is visible after reload
    drop(table);
    let mut table = reopen(&dir, TableOptions::manual());
    assert_eq!(table.get("a").unwrap().unwrap()["v"], json!(2));
    assert_eq!(table.len().unwrap(), 1);
}

/// Overwriting keeps `_modified` moving forward.
#[test]
fn test_overwrite_advances_modified() {
    let dir = TempDir::new().unwrap();
    let (mut table, _) = open(&dir, TableOptions::manual());

    let first = table.insert(json!({"_id": "a"})).unwrap();
    let second = table.insert(json!({"_id": "a"})).unwrap();
    assert!(second.modified() > first.modified());
}

// =============================================================================
// Events
// =============================================================================

/// Subscribers see mutations in order.
#[test]
fn test_subscribers_receive_mutations() {
    let dir = TempDir::new().unwrap();
    let (mut table, _) = open(&dir, TableOptions::manual());
    let events = table.subscribe();

    table.insert(json!({"_id": "a"})).unwrap();
    table.update("a", json!({"x": 1})).unwrap();
    table.update("missing", json!({"x": 1})).unwrap();
    table.delete("a").unwrap();

    let ids: Vec<String> = events
        .try_iter()
        .map(|e| e.id().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["a", "a", "a"]);
}
