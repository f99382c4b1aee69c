use std::collections::HashMap;
use std::sync::Arc;

use quill_model::{Document, Value};

use crate::error::DbError;

/// The always-present unique index over the primary key.
///
/// Backed by a hash map for O(1) `find_by_id` lookups. Every document must
/// carry a string value at the key field; dot notation is not allowed.
pub(crate) struct PrimaryIndex {
    field_name: String,
    map: HashMap<String, Arc<Document>>,
}

impl PrimaryIndex {
    pub fn new(field_name: &str) -> Result<Self, DbError> {
        if field_name.contains('.') {
            return Err(DbError::InvalidOptions(format!(
                "the primary key field cannot use dot notation: {field_name}"
            )));
        }
        Ok(Self {
            field_name: field_name.to_string(),
            map: HashMap::new(),
        })
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    fn key_of(&self, doc: &Document) -> Result<String, DbError> {
        match doc.get(&self.field_name) {
            Some(Value::String(id)) => Ok(id.clone()),
            other => Err(DbError::InvalidKey(format!(
                "documents must carry a string {}, got {other:?}",
                self.field_name
            ))),
        }
    }

    pub fn insert_one(&mut self, doc: &Arc<Document>) -> Result<(), DbError> {
        let key = self.key_of(doc)?;
        if self.map.contains_key(&key) {
            return Err(DbError::UniqueViolated {
                field: self.field_name.clone(),
                key: Some(Value::String(key)),
            });
        }
        self.map.insert(key, Arc::clone(doc));
        Ok(())
    }

    pub fn insert(&mut self, docs: &[Arc<Document>]) -> Result<(), DbError> {
        for (i, doc) in docs.iter().enumerate() {
            if let Err(e) = self.insert_one(doc) {
                for inserted in &docs[..i] {
                    self.remove_one(inserted);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn remove_one(&mut self, doc: &Arc<Document>) {
        if let Ok(key) = self.key_of(doc) {
            self.map.remove(&key);
        }
    }

    /// Vectorized update with the same rollback contract as the ordered
    /// index: any failure restores the exact prior state.
    pub fn update(&mut self, pairs: &[(Arc<Document>, Arc<Document>)]) -> Result<(), DbError> {
        for (old, _) in pairs {
            self.remove_one(old);
        }
        for (i, (_, new)) in pairs.iter().enumerate() {
            if let Err(e) = self.insert_one(new) {
                for (_, inserted) in &pairs[..i] {
                    self.remove_one(inserted);
                }
                for (old, _) in pairs {
                    let _ = self.insert_one(old);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn revert_update(&mut self, pairs: &[(Arc<Document>, Arc<Document>)]) {
        for (_, new) in pairs {
            self.remove_one(new);
        }
        for (old, _) in pairs {
            let _ = self.insert_one(old);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Document>> {
        self.map.get(id).cloned()
    }

    /// Lookup shaped like the ordered index: a scalar string resolves
    /// directly, an array unions the per-element lookups.
    pub fn get_matching(&self, value: &Value) -> Vec<Arc<Document>> {
        match value {
            Value::String(id) => self.get(id).into_iter().collect(),
            Value::Array(elements) => {
                let mut result = Vec::new();
                for element in elements {
                    if let Value::String(id) = element {
                        if let Some(doc) = self.get(id) {
                            if !result.iter().any(|d| Arc::ptr_eq(d, &doc)) {
                                result.push(doc);
                            }
                        }
                    }
                }
                result
            }
            _ => Vec::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    pub fn get_all(&self) -> Vec<Arc<Document>> {
        self.map.values().cloned().collect()
    }

    /// All documents sorted by primary key, for deterministic compaction
    /// output.
    pub fn get_all_sorted(&self) -> Vec<Arc<Document>> {
        let mut ids: Vec<&String> = self.map.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.map.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn reset(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_model::{array, doc};

    fn adoc(d: Document) -> Arc<Document> {
        Arc::new(d)
    }

    #[test]
    fn rejects_dotted_field_names() {
        assert!(PrimaryIndex::new("a.b").is_err());
    }

    #[test]
    fn rejects_non_string_ids() {
        let mut index = PrimaryIndex::new("_id").unwrap();
        let err = index.insert_one(&adoc(doc! { "_id": 0 })).unwrap_err();
        assert!(matches!(err, DbError::InvalidKey(_)));

        // "0" as a string is a perfectly good id
        index.insert_one(&adoc(doc! { "_id": "0" })).unwrap();
        assert!(index.contains("0"));
    }

    #[test]
    fn duplicate_ids_violate_uniqueness() {
        let mut index = PrimaryIndex::new("_id").unwrap();
        index.insert_one(&adoc(doc! { "_id": "x" })).unwrap();
        let err = index.insert_one(&adoc(doc! { "_id": "x" })).unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn batch_insert_rolls_back() {
        let mut index = PrimaryIndex::new("_id").unwrap();
        index.insert_one(&adoc(doc! { "_id": "b" })).unwrap();

        let docs = vec![adoc(doc! { "_id": "a" }), adoc(doc! { "_id": "b" })];
        assert!(index.insert(&docs).is_err());
        assert!(!index.contains("a"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn update_rolls_back_on_collision() {
        let mut index = PrimaryIndex::new("_id").unwrap();
        let d1 = adoc(doc! { "_id": "1" });
        let d2 = adoc(doc! { "_id": "2" });
        index.insert(&[d1.clone(), d2.clone()]).unwrap();

        let pairs = vec![(d1.clone(), adoc(doc! { "_id": "2" }))];
        assert!(index.update(&pairs).is_err());
        assert!(index.contains("1"));
        assert!(index.contains("2"));
    }

    #[test]
    fn get_matching_unions_arrays() {
        let mut index = PrimaryIndex::new("_id").unwrap();
        index.insert_one(&adoc(doc! { "_id": "a" })).unwrap();
        index.insert_one(&adoc(doc! { "_id": "b" })).unwrap();

        let found = index.get_matching(&array!["b", "a", "b", "missing"]);
        assert_eq!(found.len(), 2);
        assert!(index.get_matching(&Value::Number(1.0)).is_empty());
    }

    #[test]
    fn sorted_scan_is_deterministic() {
        let mut index = PrimaryIndex::new("_id").unwrap();
        for id in ["c", "a", "b"] {
            index.insert_one(&adoc(doc! { "_id": id })).unwrap();
        }
        let docs = index.get_all_sorted();
        let ids: Vec<&str> = docs.iter().map(|d| quill_model::doc_id(d).unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
