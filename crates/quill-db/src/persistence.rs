use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use quill_model::{deserialize_doc, doc_id, serialize_doc, Document, Value};
use quill_store::{FileStorage, Storage};
use tracing::{debug, info};

use crate::error::DbError;
use crate::options::{IndexOptions, SerializationHook};
use crate::uid::uid;

/// Everything read back from the data file: the surviving documents and the
/// index definitions that were in force at the end of the log.
#[derive(Debug, Default)]
pub(crate) struct RawData {
    pub docs: Vec<Document>,
    pub indexes: Vec<IndexOptions>,
}

struct Target {
    filename: PathBuf,
    storage: Box<dyn Storage>,
}

struct Hooks {
    after_serialization: SerializationHook,
    before_deserialization: SerializationHook,
}

/// The append-only log behind a datastore.
///
/// In-memory datastores have no target; every operation is then a no-op.
/// Appends are not individually fsynced; durability lands on
/// [`persist_cached`](Persistence::persist_cached), the crash-safe rewrite.
pub(crate) struct Persistence {
    target: Option<Target>,
    hooks: Option<Hooks>,
    corrupt_alert_threshold: f64,
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}

impl Persistence {
    pub fn new(
        filename: Option<PathBuf>,
        in_memory_only: bool,
        storage: Option<Box<dyn Storage>>,
        after_serialization: Option<SerializationHook>,
        before_deserialization: Option<SerializationHook>,
        corrupt_alert_threshold: f64,
    ) -> Result<Self, DbError> {
        if let Some(filename) = &filename {
            if filename.to_string_lossy().ends_with('~') {
                return Err(DbError::InvalidOptions(
                    "the datafile name can't end with a ~, which is reserved for crash-safe backup files"
                        .to_string(),
                ));
            }
        }
        if !(0.0..=1.0).contains(&corrupt_alert_threshold) {
            return Err(DbError::InvalidOptions(
                "corrupt_alert_threshold must be between 0 and 1".to_string(),
            ));
        }

        let hooks = match (after_serialization, before_deserialization) {
            (None, None) => None,
            (Some(after), Some(before)) => {
                validate_hooks(&after, &before)?;
                Some(Hooks {
                    after_serialization: after,
                    before_deserialization: before,
                })
            }
            _ => {
                return Err(DbError::InvalidOptions(
                    "serialization hooks must be provided as a pair".to_string(),
                ))
            }
        };

        let target = match (filename, in_memory_only) {
            (Some(filename), false) => Some(Target {
                filename,
                storage: storage.unwrap_or_else(|| Box::new(FileStorage::new())),
            }),
            _ => None,
        };

        Ok(Self {
            target,
            hooks,
            corrupt_alert_threshold,
        })
    }

    pub fn in_memory(&self) -> bool {
        self.target.is_none()
    }

    fn encode_line(&self, doc: &Document) -> Result<String, DbError> {
        let line = serialize_doc(doc)?;
        Ok(match &self.hooks {
            Some(hooks) => (hooks.after_serialization)(&line),
            None => line,
        })
    }

    fn decode_line(&self, line: &str) -> Result<Document, DbError> {
        let line = match &self.hooks {
            Some(hooks) => (hooks.before_deserialization)(line),
            None => line.to_string(),
        };
        Ok(deserialize_doc(&line)?)
    }

    /// Append new record states (documents, tombstones, index records) to
    /// the log in a single storage call.
    pub fn persist_new_state(&self, records: &[Document]) -> Result<(), DbError> {
        let Some(target) = &self.target else {
            return Ok(());
        };
        let mut payload = String::new();
        for record in records {
            payload.push_str(&self.encode_line(record)?);
            payload.push('\n');
        }
        target.storage.append(&target.filename, &payload)?;
        Ok(())
    }

    /// Compaction: rewrite the whole file to its minimal equivalent form,
    /// one line per live document plus one `$$indexCreated` line per
    /// non-primary index.
    pub fn persist_cached(
        &self,
        docs: &[Arc<Document>],
        indexes: &[IndexOptions],
    ) -> Result<(), DbError> {
        let Some(target) = &self.target else {
            return Ok(());
        };
        let mut payload = String::new();
        for doc in docs {
            payload.push_str(&self.encode_line(doc)?);
            payload.push('\n');
        }
        for spec in indexes {
            payload.push_str(&self.encode_line(&index_created_record(spec))?);
            payload.push('\n');
        }
        target.storage.crash_safe_write(&target.filename, &payload)?;
        debug!(
            docs = docs.len(),
            indexes = indexes.len(),
            "compacted data file"
        );
        Ok(())
    }

    /// Read and replay the log: repair a crashed rewrite, parse every line,
    /// and fold deletions and index records into the final picture.
    pub fn load_raw(&self) -> Result<RawData, DbError> {
        let Some(target) = &self.target else {
            return Ok(RawData::default());
        };
        target.storage.ensure_parent_dir(&target.filename)?;
        target.storage.ensure_datafile_integrity(&target.filename)?;
        let raw = target.storage.read_to_string(&target.filename)?;
        let data = self.treat_raw_data(&raw)?;
        info!(
            docs = data.docs.len(),
            indexes = data.indexes.len(),
            "loaded data file"
        );
        Ok(data)
    }

    pub(crate) fn treat_raw_data(&self, raw: &str) -> Result<RawData, DbError> {
        let mut lines: Vec<&str> = raw.split('\n').collect();
        // A data file normally ends with a newline; the empty final entry is
        // not corruption.
        if lines.last() == Some(&"") {
            lines.pop();
        }

        let mut docs: BTreeMap<String, Document> = BTreeMap::new();
        let mut indexes: BTreeMap<String, IndexOptions> = BTreeMap::new();
        let mut corrupt = 0usize;

        for line in &lines {
            let doc = match self.decode_line(line) {
                Ok(doc) => doc,
                Err(_) => {
                    corrupt += 1;
                    continue;
                }
            };

            if doc.get("$$deleted") == Some(&Value::Bool(true)) {
                if let Some(id) = doc_id(&doc) {
                    docs.remove(id);
                }
            } else if let Some(id) = doc_id(&doc) {
                docs.insert(id.to_string(), doc);
            } else if let Some(Value::Object(spec)) = doc.get("$$indexCreated") {
                if let Some(Value::String(field)) = spec.get("fieldName") {
                    indexes.insert(field.clone(), parse_index_record(field, spec));
                }
            } else if let Some(Value::String(field)) = doc.get("$$indexRemoved") {
                indexes.remove(field);
            }
        }

        let total = lines.len();
        if total > 0 && corrupt as f64 / total as f64 > self.corrupt_alert_threshold {
            return Err(DbError::CorruptDatafile {
                corrupt,
                total,
                threshold: self.corrupt_alert_threshold,
            });
        }
        if corrupt > 0 {
            debug!(corrupt, total, "skipped unparseable data file lines");
        }

        Ok(RawData {
            docs: docs.into_values().collect(),
            indexes: indexes.into_values().collect(),
        })
    }
}

pub(crate) fn index_created_record(spec: &IndexOptions) -> Document {
    let mut inner = Document::new();
    inner.insert(
        "fieldName".to_string(),
        Value::String(spec.field_name.clone()),
    );
    inner.insert("unique".to_string(), Value::Bool(spec.unique));
    inner.insert("sparse".to_string(), Value::Bool(spec.sparse));
    if let Some(seconds) = spec.expire_after_seconds {
        inner.insert("expireAfterSeconds".to_string(), Value::Number(seconds));
    }
    let mut record = Document::new();
    record.insert("$$indexCreated".to_string(), Value::Object(inner));
    record
}

/// The tombstone appended when a document is removed.
pub(crate) fn tombstone(id: &str) -> Document {
    let mut record = Document::new();
    record.insert("_id".to_string(), Value::String(id.to_string()));
    record.insert("$$deleted".to_string(), Value::Bool(true));
    record
}

/// The record appended when an index is dropped.
pub(crate) fn index_removed_record(field_name: &str) -> Document {
    let mut record = Document::new();
    record.insert(
        "$$indexRemoved".to_string(),
        Value::String(field_name.to_string()),
    );
    record
}

fn parse_index_record(field: &str, spec: &Document) -> IndexOptions {
    IndexOptions {
        field_name: field.to_string(),
        unique: spec.get("unique") == Some(&Value::Bool(true)),
        sparse: spec.get("sparse") == Some(&Value::Bool(true)),
        expire_after_seconds: spec.get("expireAfterSeconds").and_then(Value::as_number),
    }
}

/// Probe a serialization-hook pair for bijectivity: random strings of many
/// lengths must survive the round trip. A pair that silently corrupts data
/// must refuse to start.
fn validate_hooks(
    after: &SerializationHook,
    before: &SerializationHook,
) -> Result<(), DbError> {
    for len in 1..30 {
        for _ in 0..10 {
            let sample = uid(len);
            if before(&after(&sample)) != sample {
                return Err(DbError::InvalidOptions(
                    "beforeDeserialization is not the reverse of afterSerialization".to_string(),
                ));
            }
        }
    }
    Ok(())
}
