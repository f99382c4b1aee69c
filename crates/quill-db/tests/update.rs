mod common;
use common::*;

use quill_db::{array, doc, DbError, IndexOptions, UpdateOptions, Value};

// ── Update tests ────────────────────────────────────────────────

#[test]
fn set_updates_only_the_first_match_by_default() {
    let db = mem_db();
    db.insert_many(vec![
        doc! { "_id": "1", "status": "old" },
        doc! { "_id": "2", "status": "old" },
    ])
    .unwrap();

    let result = db
        .update(
            doc! { "status": "old" },
            doc! { "$set": doc! { "status": "new" } },
            UpdateOptions::default(),
        )
        .unwrap();
    assert_eq!(result.num_affected, 1);
    assert!(!result.upsert);
    assert_eq!(db.count(doc! { "status": "new" }).unwrap(), 1);
}

#[test]
fn multi_updates_every_match() {
    let db = mem_db();
    db.insert_many(vec![
        doc! { "_id": "1", "status": "old" },
        doc! { "_id": "2", "status": "old" },
        doc! { "_id": "3", "status": "other" },
    ])
    .unwrap();

    let result = db
        .update(
            doc! { "status": "old" },
            doc! { "$set": doc! { "status": "new" } },
            UpdateOptions {
                multi: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.num_affected, 2);
    assert_eq!(db.count(doc! { "status": "new" }).unwrap(), 2);
    assert_eq!(db.count(doc! { "status": "other" }).unwrap(), 1);
}

#[test]
fn replacement_update_keeps_the_id() {
    let db = mem_db();
    db.insert(doc! { "_id": "x", "a": 1, "b": 2 }).unwrap();
    db.update(
        doc! { "_id": "x" },
        doc! { "c": 3 },
        UpdateOptions::default(),
    )
    .unwrap();

    let updated = db.find_one(doc! { "_id": "x" }).unwrap().unwrap();
    assert_eq!(updated.get("c"), Some(&Value::Number(3.0)));
    assert!(!updated.contains_key("a"));
}

#[test]
fn changing_the_id_is_rejected() {
    let db = mem_db();
    db.insert(doc! { "_id": "x", "a": 1 }).unwrap();
    let err = db
        .update(
            doc! { "_id": "x" },
            doc! { "$set": doc! { "_id": "y" } },
            UpdateOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::Model(_)));
    assert_eq!(db.count(doc! { "_id": "x" }).unwrap(), 1);
}

#[test]
fn return_updated_docs_reports_new_states() {
    let db = mem_db();
    db.insert_many(vec![doc! { "_id": "1", "n": 1 }, doc! { "_id": "2", "n": 2 }])
        .unwrap();

    let result = db
        .update(
            doc! {},
            doc! { "$inc": doc! { "n": 10 } },
            UpdateOptions {
                multi: true,
                return_updated_docs: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.num_affected, 2);
    let docs = result.docs.unwrap();
    let mut values: Vec<f64> = docs
        .iter()
        .map(|d| d.get("n").and_then(Value::as_number).unwrap())
        .collect();
    values.sort_by(f64::total_cmp);
    assert_eq!(values, vec![11.0, 12.0]);
}

#[test]
fn upsert_with_multi_is_invalid() {
    let db = mem_db();
    let err = db
        .update(
            doc! {},
            doc! { "$set": doc! { "a": 1 } },
            UpdateOptions {
                multi: true,
                upsert: true,
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidOptions(_)));
}

#[test]
fn upsert_inserts_from_modifiers_when_nothing_matches() {
    let db = mem_db();
    let result = db
        .update(
            doc! { "$or": array![doc! { "a": 4 }, doc! { "a": 5 }] },
            doc! { "$set": doc! { "hello": "world" }, "$inc": doc! { "bloup": 3 } },
            UpdateOptions {
                upsert: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.num_affected, 1);
    assert!(result.upsert);

    let docs = result.docs.unwrap();
    let inserted = &docs[0];
    assert_eq!(inserted.get("hello"), Some(&Value::String("world".into())));
    assert_eq!(inserted.get("bloup"), Some(&Value::Number(3.0)));
    assert!(inserted.contains_key("_id"));
    // The $or clause did not leak into the document
    assert_eq!(inserted.len(), 3);
}

#[test]
fn upsert_uses_the_update_document_when_it_has_no_modifiers() {
    let db = mem_db();
    let result = db
        .update(
            doc! { "a": 9 },
            doc! { "fresh": true },
            UpdateOptions {
                upsert: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(result.upsert);
    assert_eq!(db.count(doc! { "fresh": true }).unwrap(), 1);
    assert_eq!(db.count(doc! { "a": 9 }).unwrap(), 0);
}

#[test]
fn upsert_updates_in_place_when_something_matches() {
    let db = mem_db();
    db.insert(doc! { "_id": "x", "a": 5 }).unwrap();
    let result = db
        .update(
            doc! { "a": 5 },
            doc! { "$set": doc! { "seen": true } },
            UpdateOptions {
                upsert: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.num_affected, 1);
    assert!(!result.upsert);
    assert_eq!(db.count(doc! {}).unwrap(), 1);
}

#[test]
fn failed_multi_index_update_rolls_everything_back() {
    let db = mem_db();
    for field in ["a", "b", "c"] {
        db.ensure_index(IndexOptions::new(field).unique(true)).unwrap();
    }
    db.insert_many(vec![
        doc! { "_id": "1", "a": 1, "b": 10, "c": 100 },
        doc! { "_id": "2", "a": 2, "b": 20, "c": 200 },
        doc! { "_id": "3", "a": 3, "b": 30, "c": 300 },
    ])
    .unwrap();

    // $set b:30 collides with document 3 on the unique "b" index; the $inc
    // on a and c must not survive either.
    let err = db
        .update(
            doc! { "a": 2 },
            doc! { "$inc": doc! { "a": 10, "c": 1000 }, "$set": doc! { "b": 30 } },
            UpdateOptions::default(),
        )
        .unwrap_err();
    assert!(err.is_unique_violation());

    // Every index still resolves the original three documents.
    for (field, values) in [
        ("a", [1.0, 2.0, 3.0]),
        ("b", [10.0, 20.0, 30.0]),
        ("c", [100.0, 200.0, 300.0]),
    ] {
        for (i, value) in values.iter().enumerate() {
            let mut query = quill_db::Document::new();
            query.insert(field.to_string(), Value::Number(*value));
            let found = db.find_one(query).unwrap().unwrap();
            let expected_id = (i + 1).to_string();
            assert_eq!(found.get("_id"), Some(&Value::String(expected_id)));
        }
    }
    assert_eq!(db.count(doc! { "a": 12 }).unwrap(), 0);
    assert_eq!(db.count(doc! { "c": 1200 }).unwrap(), 0);
}

#[test]
fn update_persists_across_reload() {
    let (db, storage, path) = file_db();
    db.insert(doc! { "_id": "x", "n": 1 }).unwrap();
    db.update(
        doc! { "_id": "x" },
        doc! { "$inc": doc! { "n": 5 } },
        UpdateOptions::default(),
    )
    .unwrap();
    drop(db);

    let db = reopen(&storage, &path);
    let doc = db.find_one(doc! { "_id": "x" }).unwrap().unwrap();
    assert_eq!(doc.get("n"), Some(&Value::Number(6.0)));
}
