use std::collections::BTreeMap;
use std::sync::Arc;

use quill_model::{
    check_document, doc_id, get_dot_value, match_query, modify, now_millis, Document,
    StringComparator, Value,
};
use tracing::warn;

use crate::error::DbError;
use crate::index::{Bounds, Index};
use crate::options::{IndexOptions, Options, RemoveOptions, UpdateOptions, UpdateResult};
use crate::persistence::{index_created_record, index_removed_record, tombstone, Persistence};
use crate::primary::PrimaryIndex;
use crate::uid::uid;

/// The mutable heart of a datastore: every index, the TTL markers and the
/// persistence layer. Owned by the executor thread, which is the exclusive
/// mutator.
pub(crate) struct Core {
    timestamp_data: bool,
    compare_strings: Option<Arc<StringComparator>>,
    primary: PrimaryIndex,
    secondary: BTreeMap<String, Index>,
    ttl_indexes: BTreeMap<String, f64>,
    persistence: Persistence,
    compaction_listeners: Vec<Box<dyn Fn() + Send>>,
}

impl Core {
    pub fn build(options: Options) -> Result<Self, DbError> {
        let persistence = Persistence::new(
            options.filename,
            options.in_memory_only,
            options.storage,
            options.after_serialization,
            options.before_deserialization,
            options.corrupt_alert_threshold,
        )?;
        Ok(Self {
            timestamp_data: options.timestamp_data,
            compare_strings: options.compare_strings,
            primary: PrimaryIndex::new("_id")?,
            secondary: BTreeMap::new(),
            ttl_indexes: BTreeMap::new(),
            persistence,
            compaction_listeners: Vec::new(),
        })
    }

    /// Whether the executor must buffer operations until `load_database`.
    pub fn requires_load(&self) -> bool {
        !self.persistence.in_memory()
    }

    pub fn compare_strings(&self) -> Option<&Arc<StringComparator>> {
        self.compare_strings.as_ref()
    }

    // ── Index plumbing ──────────────────────────────────────────

    /// Add one document to every index, primary first. A failure in any
    /// index removes the document from every index already touched.
    fn add_doc_to_indexes(&mut self, doc: &Arc<Document>) -> Result<(), DbError> {
        self.primary.insert_one(doc)?;

        let mut touched: Vec<String> = Vec::new();
        let mut failure: Option<DbError> = None;
        for (name, index) in self.secondary.iter_mut() {
            match index.insert_one(doc) {
                Ok(()) => touched.push(name.clone()),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            for name in &touched {
                if let Some(index) = self.secondary.get_mut(name) {
                    index.remove_one(doc);
                }
            }
            self.primary.remove_one(doc);
            return Err(e);
        }
        Ok(())
    }

    /// Batch variant: a failure on document `k` also rolls back documents
    /// `0..k` before surfacing the error.
    fn add_docs_to_indexes(&mut self, docs: &[Arc<Document>]) -> Result<(), DbError> {
        for (i, doc) in docs.iter().enumerate() {
            if let Err(e) = self.add_doc_to_indexes(doc) {
                for inserted in &docs[..i] {
                    self.remove_doc_from_indexes(inserted);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn remove_doc_from_indexes(&mut self, doc: &Arc<Document>) {
        for index in self.secondary.values_mut() {
            index.remove_one(doc);
        }
        self.primary.remove_one(doc);
    }

    /// Swap old versions for new ones atomically across every index.
    fn update_indexes(
        &mut self,
        pairs: &[(Arc<Document>, Arc<Document>)],
    ) -> Result<(), DbError> {
        self.primary.update(pairs)?;

        let mut touched: Vec<String> = Vec::new();
        let mut failure: Option<DbError> = None;
        for (name, index) in self.secondary.iter_mut() {
            match index.update(pairs) {
                Ok(()) => touched.push(name.clone()),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            for name in &touched {
                if let Some(index) = self.secondary.get_mut(name) {
                    index.revert_update(pairs);
                }
            }
            self.primary.revert_update(pairs);
            return Err(e);
        }
        Ok(())
    }

    fn revert_update_indexes(&mut self, pairs: &[(Arc<Document>, Arc<Document>)]) {
        for index in self.secondary.values_mut() {
            index.revert_update(pairs);
        }
        self.primary.revert_update(pairs);
    }

    pub fn get_all_data(&self) -> Vec<Arc<Document>> {
        self.primary.get_all()
    }

    // ── Insert ──────────────────────────────────────────────────

    fn create_new_id(&self) -> String {
        loop {
            let id = uid(16);
            if !self.primary.contains(&id) {
                return id;
            }
        }
    }

    pub fn insert(&mut self, docs: Vec<Document>) -> Result<Vec<Document>, DbError> {
        let now = now_millis();
        let mut prepared: Vec<Arc<Document>> = Vec::with_capacity(docs.len());
        for mut doc in docs {
            if !doc.contains_key("_id") {
                doc.insert("_id".to_string(), Value::String(self.create_new_id()));
            }
            if self.timestamp_data {
                doc.entry("createdAt".to_string())
                    .or_insert(Value::Date(now));
                doc.entry("updatedAt".to_string())
                    .or_insert(Value::Date(now));
            }
            check_document(&doc)?;
            prepared.push(Arc::new(doc));
        }

        self.add_docs_to_indexes(&prepared)?;

        let records: Vec<Document> = prepared.iter().map(|d| (**d).clone()).collect();
        if let Err(e) = self.persistence.persist_new_state(&records) {
            for doc in &prepared {
                self.remove_doc_from_indexes(doc);
            }
            return Err(e);
        }
        Ok(records)
    }

    // ── Candidate selection ─────────────────────────────────────

    /// A superset of the query result, picked by the cheapest applicable
    /// index. Unless `skip_expiration` is set, candidates whose TTL field
    /// is old enough are reaped before the set is returned.
    pub fn get_candidates(
        &mut self,
        query: &Document,
        skip_expiration: bool,
    ) -> Result<Vec<Arc<Document>>, DbError> {
        let candidates = self.select_candidates(query)?;
        if skip_expiration || self.ttl_indexes.is_empty() {
            return Ok(candidates);
        }

        let now = now_millis();
        let mut live = Vec::with_capacity(candidates.len());
        let mut expired: Vec<Arc<Document>> = Vec::new();
        'candidates: for doc in candidates {
            for (field, seconds) in &self.ttl_indexes {
                if let Some(Value::Date(ms)) = get_dot_value(&doc, field) {
                    if (ms as f64) < now as f64 - seconds * 1000.0 {
                        expired.push(doc);
                        continue 'candidates;
                    }
                }
            }
            live.push(doc);
        }

        // Reaping is best-effort: an expired document must not break the
        // read that noticed it.
        for doc in expired {
            if let Err(e) = self.remove_expired(&doc) {
                warn!(error = %e, "failed to reap an expired document");
            }
        }
        Ok(live)
    }

    fn remove_expired(&mut self, doc: &Arc<Document>) -> Result<(), DbError> {
        self.remove_doc_from_indexes(doc);
        if let Some(id) = doc_id(doc) {
            self.persistence.persist_new_state(&[tombstone(id)])?;
        }
        Ok(())
    }

    fn select_candidates(&self, query: &Document) -> Result<Vec<Arc<Document>>, DbError> {
        // Primary-key point lookup.
        if query.len() == 1 {
            if let Some(value) = query.get("_id") {
                let operator_doc =
                    matches!(value, Value::Object(o) if o.keys().any(|k| k.starts_with('$')));
                if !operator_doc {
                    return Ok(self.primary.get_matching(value));
                }
            }
        }

        // A simple scalar clause on an indexed field.
        for (key, value) in query {
            if is_simple(value) {
                if key == self.primary.field_name() {
                    return Ok(self.primary.get_matching(value));
                }
                if let Some(index) = self.secondary.get(key) {
                    return Ok(index.get_matching(value));
                }
            }
        }

        // An $in clause on an indexed field.
        for (key, value) in query {
            if let Value::Object(clause) = value {
                if let Some(in_list) = clause.get("$in") {
                    if !in_list.is_array() {
                        return Err(DbError::Model(quill_model::ModelError::InvalidQuery(
                            "$in operator called without an array".to_string(),
                        )));
                    }
                    if key == self.primary.field_name() {
                        return Ok(self.primary.get_matching(in_list));
                    }
                    if let Some(index) = self.secondary.get(key) {
                        return Ok(index.get_matching(in_list));
                    }
                }
            }
        }

        // A range clause on an ordered indexed field.
        for (key, value) in query {
            if let Value::Object(clause) = value {
                let has_range = clause
                    .keys()
                    .any(|k| matches!(k.as_str(), "$lt" | "$lte" | "$gt" | "$gte"));
                if has_range {
                    if let Some(index) = self.secondary.get(key) {
                        let bounds = Bounds {
                            gt: clause.get("$gt").cloned(),
                            gte: clause.get("$gte").cloned(),
                            lt: clause.get("$lt").cloned(),
                            lte: clause.get("$lte").cloned(),
                        };
                        return Ok(index.get_between_bounds(&bounds));
                    }
                }
            }
        }

        Ok(self.primary.get_all())
    }

    // ── Update ──────────────────────────────────────────────────

    pub fn update(
        &mut self,
        query: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult, DbError> {
        if options.upsert && options.multi {
            return Err(DbError::InvalidOptions(
                "upsert cannot be combined with multi".to_string(),
            ));
        }

        let candidates = self.get_candidates(query, false)?;

        if options.upsert {
            let mut matched = false;
            for candidate in &candidates {
                if match_query(candidate, query)? {
                    matched = true;
                    break;
                }
            }
            if !matched {
                let has_modifiers = update.keys().any(|k| k.starts_with('$'));
                let to_insert = if has_modifiers {
                    // Build the base from the query, stripping operator
                    // clauses, then apply the modifiers to it.
                    modify(&strip_operator_keys(query), update)?
                } else {
                    update.clone()
                };
                let inserted = self.insert(vec![to_insert])?;
                return Ok(UpdateResult {
                    num_affected: 1,
                    docs: Some(inserted),
                    upsert: true,
                });
            }
        }

        let now = now_millis();
        let mut pairs: Vec<(Arc<Document>, Arc<Document>)> = Vec::new();
        for old in &candidates {
            if !options.multi && !pairs.is_empty() {
                break;
            }
            if !match_query(old, query)? {
                continue;
            }
            let mut new_doc = modify(old, update)?;
            if self.timestamp_data {
                if let Some(created) = old.get("createdAt") {
                    new_doc.insert("createdAt".to_string(), created.clone());
                }
                new_doc.insert("updatedAt".to_string(), Value::Date(now));
            }
            pairs.push((Arc::clone(old), Arc::new(new_doc)));
        }

        if pairs.is_empty() {
            return Ok(UpdateResult {
                num_affected: 0,
                docs: options.return_updated_docs.then(Vec::new),
                upsert: false,
            });
        }

        self.update_indexes(&pairs)?;

        let new_states: Vec<Document> = pairs.iter().map(|(_, new)| (**new).clone()).collect();
        if let Err(e) = self.persistence.persist_new_state(&new_states) {
            self.revert_update_indexes(&pairs);
            return Err(e);
        }
        Ok(UpdateResult {
            num_affected: pairs.len(),
            docs: options.return_updated_docs.then_some(new_states),
            upsert: false,
        })
    }

    // ── Remove ──────────────────────────────────────────────────

    pub fn remove(
        &mut self,
        query: &Document,
        options: RemoveOptions,
    ) -> Result<usize, DbError> {
        // Expired documents are legitimate removal targets too.
        let candidates = self.get_candidates(query, true)?;

        let mut to_remove: Vec<Arc<Document>> = Vec::new();
        for doc in &candidates {
            if !options.multi && !to_remove.is_empty() {
                break;
            }
            if match_query(doc, query)? {
                to_remove.push(Arc::clone(doc));
            }
        }
        if to_remove.is_empty() {
            return Ok(0);
        }

        let mut tombstones = Vec::with_capacity(to_remove.len());
        for doc in &to_remove {
            self.remove_doc_from_indexes(doc);
            if let Some(id) = doc_id(doc) {
                tombstones.push(tombstone(id));
            }
        }

        if let Err(e) = self.persistence.persist_new_state(&tombstones) {
            for doc in &to_remove {
                let _ = self.add_doc_to_indexes(doc);
            }
            return Err(e);
        }
        Ok(to_remove.len())
    }

    // ── Index management ────────────────────────────────────────

    pub fn ensure_index(&mut self, options: IndexOptions) -> Result<(), DbError> {
        if options.field_name.is_empty() {
            return Err(DbError::InvalidOptions(
                "cannot create an index without a field name".to_string(),
            ));
        }
        // Idempotent: an existing index (including the primary) is left as
        // it is, options and all.
        if options.field_name == self.primary.field_name()
            || self.secondary.contains_key(&options.field_name)
        {
            return Ok(());
        }

        let docs = self.get_all_data();
        if options.expire_after_seconds.is_some() {
            // TTL is defined for date fields, not arrays of dates.
            for doc in &docs {
                if get_dot_value(doc, &options.field_name).is_some_and(|v| v.is_array()) {
                    return Err(DbError::InvalidOptions(format!(
                        "cannot declare a TTL on the array-valued field {}",
                        options.field_name
                    )));
                }
            }
        }

        let mut index = Index::new(&options.field_name, options.unique, options.sparse);
        index.insert(&docs)?;

        self.persistence
            .persist_new_state(&[index_created_record(&options)])?;

        if let Some(seconds) = options.expire_after_seconds {
            self.ttl_indexes.insert(options.field_name.clone(), seconds);
        }
        self.secondary.insert(options.field_name.clone(), index);
        Ok(())
    }

    pub fn remove_index(&mut self, field_name: &str) -> Result<(), DbError> {
        // Removing a nonexistent index is not an error.
        self.secondary.remove(field_name);
        self.persistence
            .persist_new_state(&[index_removed_record(field_name)])?;
        Ok(())
    }

    // ── Load & compaction ───────────────────────────────────────

    pub fn load_database(&mut self) -> Result<(), DbError> {
        if self.persistence.in_memory() {
            return Ok(());
        }

        self.primary.reset();
        self.secondary.clear();
        self.ttl_indexes.clear();

        let raw = self.persistence.load_raw()?;
        for spec in &raw.indexes {
            if let Some(seconds) = spec.expire_after_seconds {
                self.ttl_indexes.insert(spec.field_name.clone(), seconds);
            }
            self.secondary.insert(
                spec.field_name.clone(),
                Index::new(&spec.field_name, spec.unique, spec.sparse),
            );
        }

        let docs: Vec<Arc<Document>> = raw.docs.into_iter().map(Arc::new).collect();
        if let Err(e) = self.add_docs_to_indexes(&docs) {
            // A half-loaded database is worse than an empty one.
            self.primary.reset();
            for index in self.secondary.values_mut() {
                index.reset();
            }
            return Err(e);
        }

        self.compact()
    }

    /// Rewrite the data file to its minimal equivalent form and notify the
    /// compaction observers.
    pub fn compact(&mut self) -> Result<(), DbError> {
        if self.persistence.in_memory() {
            return Ok(());
        }
        let docs = self.primary.get_all_sorted();
        let specs: Vec<IndexOptions> = self
            .secondary
            .values()
            .map(|index| IndexOptions {
                field_name: index.field_name().to_string(),
                unique: index.unique(),
                sparse: index.sparse(),
                expire_after_seconds: self.ttl_indexes.get(index.field_name()).copied(),
            })
            .collect();
        self.persistence.persist_cached(&docs, &specs)?;
        for listener in &self.compaction_listeners {
            listener();
        }
        Ok(())
    }

    pub fn on_compaction_done(&mut self, listener: Box<dyn Fn() + Send>) {
        self.compaction_listeners.push(listener);
    }
}

fn is_simple(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Date(_)
    )
}

/// Deep copy of a query with every `$`-operator clause and dotted key
/// stripped: the base document of a modifier upsert.
fn strip_operator_keys(query: &Document) -> Document {
    let mut out = Document::new();
    for (key, value) in query {
        if key.starts_with('$') || key.contains('.') {
            continue;
        }
        out.insert(key.clone(), strip_value(value));
    }
    out
}

fn strip_value(value: &Value) -> Value {
    match value {
        Value::Object(doc) => Value::Object(strip_operator_keys(doc)),
        Value::Array(items) => Value::Array(items.iter().map(strip_value).collect()),
        other => other.clone(),
    }
}
