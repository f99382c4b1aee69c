mod common;
use common::*;

use std::thread;
use std::time::Duration;

use quill_db::{array, doc, now_millis, DbError, IndexOptions, RemoveOptions, Value};

// ── TTL tests ───────────────────────────────────────────────────

#[test]
fn expired_documents_vanish_on_read() {
    let (db, _storage, _path) = file_db();
    db.ensure_index(IndexOptions::new("exp").expire_after_seconds(0.2))
        .unwrap();
    db.insert(doc! { "hello": "world", "exp": Value::Date(now_millis()) })
        .unwrap();

    assert!(db.find_one(doc! {}).unwrap().is_some());

    thread::sleep(Duration::from_millis(300));
    assert!(db.find_one(doc! {}).unwrap().is_none());
}

#[test]
fn compaction_after_expiry_leaves_no_trace() {
    let (db, storage, path) = file_db();
    db.ensure_index(IndexOptions::new("exp").expire_after_seconds(0.2))
        .unwrap();
    db.insert(doc! { "hello": "world", "exp": Value::Date(now_millis()) })
        .unwrap();

    thread::sleep(Duration::from_millis(300));
    assert!(db.find_one(doc! {}).unwrap().is_none());

    db.compact_datafile().unwrap();
    let contents = storage.contents(&path).unwrap();
    assert!(!contents.contains("world"));
    assert!(contents.contains("$$indexCreated"));
}

#[test]
fn fresh_documents_survive_reads() {
    let db = mem_db();
    db.ensure_index(IndexOptions::new("exp").expire_after_seconds(60.0))
        .unwrap();
    db.insert(doc! { "_id": "x", "exp": Value::Date(now_millis()) })
        .unwrap();
    assert!(db.find_one(doc! { "_id": "x" }).unwrap().is_some());
}

#[test]
fn documents_without_the_ttl_field_never_expire() {
    let db = mem_db();
    db.ensure_index(IndexOptions::new("exp").expire_after_seconds(0.0))
        .unwrap();
    db.insert(doc! { "_id": "x", "name": "permanent" }).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(db.find_one(doc! { "_id": "x" }).unwrap().is_some());
}

#[test]
fn non_date_ttl_fields_are_ignored() {
    let db = mem_db();
    db.ensure_index(IndexOptions::new("exp").expire_after_seconds(0.0))
        .unwrap();
    db.insert(doc! { "_id": "x", "exp": 123 }).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(db.find_one(doc! { "_id": "x" }).unwrap().is_some());
}

#[test]
fn expired_documents_are_still_removable() {
    let db = mem_db();
    db.ensure_index(IndexOptions::new("exp").expire_after_seconds(3600.0))
        .unwrap();
    // Already far past its expiry
    db.insert(doc! { "_id": "x", "exp": Value::Date(now_millis() - 10_000_000) })
        .unwrap();

    // Invisible to reads…
    assert!(db.find_one(doc! { "_id": "x" }).unwrap().is_none());

    // A fresh expired doc is a legitimate removal target: removal skips
    // expiration so the count is exact.
    db.insert(doc! { "_id": "y", "exp": Value::Date(now_millis() - 10_000_000) })
        .unwrap();
    let removed = db
        .remove(doc! { "_id": "y" }, RemoveOptions::default())
        .unwrap();
    assert_eq!(removed, 1);
}

#[test]
fn expiry_writes_a_tombstone() {
    let (db, storage, path) = file_db();
    db.ensure_index(IndexOptions::new("exp").expire_after_seconds(0.0))
        .unwrap();
    db.insert(doc! { "_id": "x", "exp": Value::Date(now_millis() - 1_000) })
        .unwrap();

    assert!(db.find_one(doc! {}).unwrap().is_none());
    let lines = file_lines(&storage, &path);
    assert!(lines
        .iter()
        .any(|line| line.contains("$$deleted") && line.contains("\"x\"")));
}

#[test]
fn ttl_marker_survives_reload() {
    let (db, storage, path) = file_db();
    db.ensure_index(IndexOptions::new("exp").expire_after_seconds(0.0))
        .unwrap();
    drop(db);

    let db = reopen(&storage, &path);
    db.insert(doc! { "_id": "x", "exp": Value::Date(now_millis() - 1_000) })
        .unwrap();
    assert!(db.find_one(doc! { "_id": "x" }).unwrap().is_none());
}

#[test]
fn ttl_on_an_array_valued_field_is_rejected() {
    let db = mem_db();
    db.insert(doc! { "_id": "x", "exp": array![Value::Date(1), Value::Date(2)] })
        .unwrap();

    let err = db
        .ensure_index(IndexOptions::new("exp").expire_after_seconds(60.0))
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidOptions(_)));
}
