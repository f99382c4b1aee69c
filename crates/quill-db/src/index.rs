use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use quill_model::{compare_things, doc_id, get_dot_value, Document, Value};

use crate::error::DbError;

/// Key of an ordered index. `None` is the "undefined" key: a non-sparse
/// index stores documents lacking the field under it.
#[derive(Debug, Clone)]
pub(crate) struct IndexKey(pub(crate) Option<Value>);

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_things(self.0.as_ref(), other.0.as_ref())
    }
}

/// Range bounds for an ordered-index scan, mirroring the comparison
/// operators of a query (`{$gt, $gte, $lt, $lte}`).
#[derive(Debug, Clone, Default)]
pub struct Bounds {
    pub gt: Option<Value>,
    pub gte: Option<Value>,
    pub lt: Option<Value>,
    pub lte: Option<Value>,
}

/// An ordered secondary index over one (possibly dotted) field.
///
/// Array-valued fields fan out: the document is stored once under each
/// distinct element. All mutating operations are atomic: a failure leaves
/// the index exactly as it was.
pub(crate) struct Index {
    field_name: String,
    unique: bool,
    sparse: bool,
    tree: BTreeMap<IndexKey, Vec<Arc<Document>>>,
}

impl Index {
    pub fn new(field_name: &str, unique: bool, sparse: bool) -> Self {
        Self {
            field_name: field_name.to_string(),
            unique,
            sparse,
            tree: BTreeMap::new(),
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn unique(&self) -> bool {
        self.unique
    }

    pub fn sparse(&self) -> bool {
        self.sparse
    }

    /// The distinct keys this document is indexed under. `None` (no keys)
    /// means the document is skipped entirely (sparse, field missing).
    fn keys_for(&self, doc: &Document) -> Vec<Option<Value>> {
        match get_dot_value(doc, &self.field_name) {
            None if self.sparse => Vec::new(),
            None => vec![None],
            Some(Value::Array(elements)) => {
                // Dedupe: dates compare by timestamp, so duplicates collapse.
                let mut keys: Vec<Option<Value>> = Vec::new();
                for element in elements {
                    let seen = keys.iter().any(|k| {
                        compare_things(k.as_ref(), Some(&element)) == Ordering::Equal
                    });
                    if !seen {
                        keys.push(Some(element));
                    }
                }
                keys
            }
            Some(value) => vec![Some(value)],
        }
    }

    fn insert_key(&mut self, key: Option<Value>, doc: &Arc<Document>) -> Result<(), DbError> {
        let tree_key = IndexKey(key);
        if self.unique && self.tree.get(&tree_key).is_some_and(|b| !b.is_empty()) {
            return Err(DbError::UniqueViolated {
                field: self.field_name.clone(),
                key: tree_key.0,
            });
        }
        self.tree.entry(tree_key).or_default().push(Arc::clone(doc));
        Ok(())
    }

    fn remove_key(&mut self, key: &Option<Value>, doc: &Arc<Document>) {
        let tree_key = IndexKey(key.clone());
        if let Some(bucket) = self.tree.get_mut(&tree_key) {
            bucket.retain(|candidate| !same_doc(candidate, doc));
            if bucket.is_empty() {
                self.tree.remove(&tree_key);
            }
        }
    }

    /// Index one document. On a partial failure across array keys, the keys
    /// already inserted are removed before the error surfaces.
    pub fn insert_one(&mut self, doc: &Arc<Document>) -> Result<(), DbError> {
        let keys = self.keys_for(doc);
        for (i, key) in keys.iter().enumerate() {
            if let Err(e) = self.insert_key(key.clone(), doc) {
                for inserted in &keys[..i] {
                    self.remove_key(inserted, doc);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Index a batch. On any failure every document inserted so far is
    /// removed before the error surfaces.
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

    /// Remove a document. Never fails: removing is always safe with respect
    /// to uniqueness.
    pub fn remove_one(&mut self, doc: &Arc<Document>) {
        for key in self.keys_for(doc) {
            self.remove_key(&key, doc);
        }
    }

    /// Swap one document version for another. If the insert of the new
    /// version fails, the old version is restored.
    pub fn update_one(
        &mut self,
        old: &Arc<Document>,
        new: &Arc<Document>,
    ) -> Result<(), DbError> {
        self.remove_one(old);
        if let Err(e) = self.insert_one(new) {
            // Reinserting what was just removed cannot fail.
            let _ = self.insert_one(old);
            return Err(e);
        }
        Ok(())
    }

    /// Vectorized update: remove every old version, then insert every new
    /// one. Any failure rolls the whole batch back.
    pub fn update(&mut self, pairs: &[(Arc<Document>, Arc<Document>)]) -> Result<(), DbError> {
        if let [(old, new)] = pairs {
            return self.update_one(old, new);
        }
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

    /// Undo a committed [`update`](Self::update): swap the roles of old and
    /// new. Cannot fail, since the old versions held their keys before.
    pub fn revert_update(&mut self, pairs: &[(Arc<Document>, Arc<Document>)]) {
        for (_, new) in pairs {
            self.remove_one(new);
        }
        for (old, _) in pairs {
            let _ = self.insert_one(old);
        }
    }

    /// Documents stored under a key. An array value unions the per-element
    /// lookups, deduplicated by `_id` in first-seen order.
    pub fn get_matching(&self, value: &Value) -> Vec<Arc<Document>> {
        match value {
            Value::Array(elements) => {
                let mut seen_ids: Vec<String> = Vec::new();
                let mut result = Vec::new();
                for element in elements {
                    for doc in self.search(Some(element)) {
                        let id = doc_id(&doc).unwrap_or_default().to_string();
                        if !seen_ids.contains(&id) {
                            seen_ids.push(id);
                            result.push(doc);
                        }
                    }
                }
                result
            }
            _ => self.search(Some(value)),
        }
    }

    fn search(&self, key: Option<&Value>) -> Vec<Arc<Document>> {
        self.tree
            .get(&IndexKey(key.cloned()))
            .map(|bucket| bucket.to_vec())
            .unwrap_or_default()
    }

    /// Documents whose keys fall inside the bounds, in key order.
    pub fn get_between_bounds(&self, bounds: &Bounds) -> Vec<Arc<Document>> {
        use std::ops::Bound;

        let lower = if let Some(gt) = &bounds.gt {
            Bound::Excluded(IndexKey(Some(gt.clone())))
        } else if let Some(gte) = &bounds.gte {
            Bound::Included(IndexKey(Some(gte.clone())))
        } else {
            Bound::Unbounded
        };
        let upper = if let Some(lt) = &bounds.lt {
            Bound::Excluded(IndexKey(Some(lt.clone())))
        } else if let Some(lte) = &bounds.lte {
            Bound::Included(IndexKey(Some(lte.clone())))
        } else {
            Bound::Unbounded
        };

        // An inverted or degenerate range matches nothing (BTreeMap::range
        // would panic on it).
        let empty = match (&lower, &upper) {
            (
                Bound::Included(lo) | Bound::Excluded(lo),
                Bound::Included(hi) | Bound::Excluded(hi),
            ) => match lo.cmp(hi) {
                Ordering::Greater => true,
                Ordering::Equal => {
                    !matches!((&lower, &upper), (Bound::Included(_), Bound::Included(_)))
                }
                Ordering::Less => false,
            },
            _ => false,
        };
        if empty {
            return Vec::new();
        }

        let mut result = Vec::new();
        for (_, bucket) in self.tree.range((lower, upper)) {
            result.extend(bucket.iter().cloned());
        }
        result
    }

    /// Every indexed document, flattened in key order.
    pub fn get_all(&self) -> Vec<Arc<Document>> {
        self.tree.values().flat_map(|b| b.iter().cloned()).collect()
    }

    pub fn reset(&mut self) {
        self.tree.clear();
    }

    /// Number of distinct keys in the tree.
    #[cfg(test)]
    pub fn key_count(&self) -> usize {
        self.tree.len()
    }
}

fn same_doc(a: &Arc<Document>, b: &Arc<Document>) -> bool {
    Arc::ptr_eq(a, b) || (doc_id(a).is_some() && doc_id(a) == doc_id(b))
}
