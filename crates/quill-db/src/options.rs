use std::path::PathBuf;
use std::sync::Arc;

use quill_model::{Document, StringComparator};
use quill_store::Storage;

/// A string transform applied to every record line on its way to or from
/// the data file (e.g. for at-rest encryption).
pub type SerializationHook = Box<dyn Fn(&str) -> String + Send>;

/// Datastore construction options.
///
/// Omitting the filename (or forcing `in_memory_only`) yields a purely
/// in-memory datastore that skips every persistence step.
pub struct Options {
    pub(crate) filename: Option<PathBuf>,
    pub(crate) in_memory_only: bool,
    pub(crate) timestamp_data: bool,
    pub(crate) autoload: bool,
    pub(crate) corrupt_alert_threshold: f64,
    pub(crate) after_serialization: Option<SerializationHook>,
    pub(crate) before_deserialization: Option<SerializationHook>,
    pub(crate) compare_strings: Option<Arc<StringComparator>>,
    pub(crate) storage: Option<Box<dyn Storage>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            filename: None,
            in_memory_only: false,
            timestamp_data: false,
            autoload: false,
            corrupt_alert_threshold: 0.1,
            after_serialization: None,
            before_deserialization: None,
            compare_strings: None,
            storage: None,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the append-only data file.
    pub fn filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Keep everything in memory even when a filename is set.
    pub fn in_memory_only(mut self, in_memory_only: bool) -> Self {
        self.in_memory_only = in_memory_only;
        self
    }

    /// Maintain `createdAt` / `updatedAt` dates automatically.
    pub fn timestamp_data(mut self, timestamp_data: bool) -> Self {
        self.timestamp_data = timestamp_data;
        self
    }

    /// Load the database during [`Datastore::open`](crate::Datastore::open),
    /// surfacing any load error from the constructor.
    pub fn autoload(mut self, autoload: bool) -> Self {
        self.autoload = autoload;
        self
    }

    /// Fraction (0.0–1.0) of unparseable data-file lines above which loading
    /// refuses to proceed. Defaults to 0.1.
    pub fn corrupt_alert_threshold(mut self, threshold: f64) -> Self {
        self.corrupt_alert_threshold = threshold;
        self
    }

    /// Transform applied to each serialized line before it is written.
    /// Requires a matching [`before_deserialization`](Self::before_deserialization)
    /// inverse; the pair is probed for bijectivity at construction.
    pub fn after_serialization(
        mut self,
        hook: impl Fn(&str) -> String + Send + 'static,
    ) -> Self {
        self.after_serialization = Some(Box::new(hook));
        self
    }

    /// Inverse of [`after_serialization`](Self::after_serialization), applied
    /// to each line read from disk.
    pub fn before_deserialization(
        mut self,
        hook: impl Fn(&str) -> String + Send + 'static,
    ) -> Self {
        self.before_deserialization = Some(Box::new(hook));
        self
    }

    /// Alternative string comparator used by sorts.
    pub fn compare_strings(
        mut self,
        cmp: impl Fn(&str, &str) -> std::cmp::Ordering + Send + Sync + 'static,
    ) -> Self {
        self.compare_strings = Some(Arc::new(cmp));
        self
    }

    /// Override the storage capability (tests inject in-memory or failing
    /// storage here).
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }
}

/// Options for [`Datastore::ensure_index`](crate::Datastore::ensure_index).
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub field_name: String,
    pub unique: bool,
    pub sparse: bool,
    /// Declares the field as a TTL marker: documents whose field holds a
    /// date older than this many seconds are reaped on read.
    pub expire_after_seconds: Option<f64>,
}

impl IndexOptions {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            ..Default::default()
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    pub fn expire_after_seconds(mut self, seconds: f64) -> Self {
        self.expire_after_seconds = Some(seconds);
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Modify every matching document instead of only the first.
    pub multi: bool,
    /// Insert a synthesized document when nothing matches.
    pub upsert: bool,
    /// Return the post-update documents in [`UpdateResult::docs`].
    pub return_updated_docs: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Remove every matching document instead of only the first.
    pub multi: bool,
}

/// Outcome of an update.
#[derive(Debug, Clone, Default)]
pub struct UpdateResult {
    pub num_affected: usize,
    /// Present only when `return_updated_docs` was set (always present on
    /// an upsert insert).
    pub docs: Option<Vec<Document>>,
    /// Whether the update inserted a new document.
    pub upsert: bool,
}
