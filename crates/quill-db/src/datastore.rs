use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quill_model::Document;

use crate::core::Core;
use crate::cursor::Cursor;
use crate::error::DbError;
use crate::executor::{Executor, Ticket};
use crate::options::{IndexOptions, Options, RemoveOptions, UpdateOptions, UpdateResult};
use crate::sweep::{self, AutocompactionHandle};

/// An embedded collection of documents backed by one append-only file.
///
/// All operations are serialized through a single executor; two operations
/// never overlap, and an operation issued before another observes its
/// in-memory effects. A persistent datastore buffers operations issued
/// before [`load_database`](Self::load_database) and replays them, in
/// order, once the file is loaded; use the `*_queued` variants (and
/// [`Cursor::exec_queued`]) to issue work before the load without
/// blocking.
pub struct Datastore {
    executor: Arc<Executor>,
    autocompaction: Mutex<Option<AutocompactionHandle>>,
}

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore").finish_non_exhaustive()
    }
}

impl Datastore {
    /// Open a datastore. With `autoload`, the data file is loaded before
    /// this returns and any load error surfaces here.
    pub fn open(options: Options) -> Result<Datastore, DbError> {
        let autoload = options.autoload;
        let core = Core::build(options)?;
        let buffering = core.requires_load();
        let executor = Arc::new(Executor::start(core, buffering));
        let datastore = Datastore {
            executor,
            autocompaction: Mutex::new(None),
        };
        if autoload {
            datastore.load_database()?;
        }
        Ok(datastore)
    }

    /// A purely in-memory datastore, ready without loading.
    pub fn in_memory() -> Datastore {
        // Building an in-memory core cannot fail: there is no filename and
        // no hooks to validate.
        match Self::open(Options::new()) {
            Ok(datastore) => datastore,
            Err(_) => unreachable!("in-memory datastores have nothing to validate"),
        }
    }

    fn enqueue<T, F>(&self, forced: bool, job: F) -> Ticket<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Core) -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.executor.submit(
            forced,
            Box::new(move |core| {
                let _ = tx.send(job(core));
            }),
        );
        Ticket::new(rx)
    }

    fn run<T, F>(&self, forced: bool, job: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&mut Core) -> T + Send + 'static,
    {
        self.enqueue(forced, job).wait()
    }

    /// Read the data file and rebuild every index from it. Buffered
    /// operations are replayed (in order) only after a successful load.
    pub fn load_database(&self) -> Result<(), DbError> {
        let drain = self.executor.drain_handle();
        self.run(true, move |core| {
            let result = core.load_database();
            if result.is_ok() {
                drain.signal();
            }
            result
        })
    }

    // ── Writes ──────────────────────────────────────────────────

    /// Insert one document. A missing `_id` is assigned a random
    /// alphanumeric id. The returned document is a deep clone of what was
    /// cached.
    pub fn insert(&self, doc: Document) -> Result<Document, DbError> {
        let mut docs = self.run(false, move |core| core.insert(vec![doc]))?;
        Ok(docs.remove(0))
    }

    /// Insert a batch atomically: on any failure (key rules, unique
    /// violations) no document of the batch is kept.
    pub fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Document>, DbError> {
        self.run(false, move |core| core.insert(docs))
    }

    /// Non-blocking insert, for use before the database has loaded.
    pub fn insert_queued(&self, docs: Vec<Document>) -> Ticket<Result<Vec<Document>, DbError>> {
        self.enqueue(false, move |core| core.insert(docs))
    }

    /// Update documents matching `query`.
    pub fn update(
        &self,
        query: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult, DbError> {
        self.run(false, move |core| core.update(&query, &update, options))
    }

    pub fn update_queued(
        &self,
        query: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Ticket<Result<UpdateResult, DbError>> {
        self.enqueue(false, move |core| core.update(&query, &update, options))
    }

    /// Remove documents matching `query`, returning how many went away.
    pub fn remove(&self, query: Document, options: RemoveOptions) -> Result<usize, DbError> {
        self.run(false, move |core| core.remove(&query, options))
    }

    pub fn remove_queued(
        &self,
        query: Document,
        options: RemoveOptions,
    ) -> Ticket<Result<usize, DbError>> {
        self.enqueue(false, move |core| core.remove(&query, options))
    }

    // ── Reads ───────────────────────────────────────────────────

    /// Start a query. Refine with [`Cursor`] builder methods, then `exec`.
    pub fn find(&self, query: Document) -> Cursor {
        Cursor::new(Arc::clone(&self.executor), query)
    }

    /// First document matching `query`, if any.
    pub fn find_one(&self, query: Document) -> Result<Option<Document>, DbError> {
        self.find(query).first()
    }

    /// Number of documents matching `query`.
    pub fn count(&self, query: Document) -> Result<usize, DbError> {
        self.find(query).count()
    }

    /// Deep clones of every cached document.
    pub fn get_all_data(&self) -> Vec<Document> {
        self.run(false, |core| {
            core.get_all_data().iter().map(|d| (**d).clone()).collect()
        })
    }

    // ── Indexes ─────────────────────────────────────────────────

    /// Create an index. Idempotent per field name: a second call neither
    /// duplicates entries nor alters options.
    pub fn ensure_index(&self, options: IndexOptions) -> Result<(), DbError> {
        self.run(false, move |core| core.ensure_index(options))
    }

    /// Drop an index. Dropping a nonexistent index is not an error.
    pub fn remove_index(&self, field_name: &str) -> Result<(), DbError> {
        let field_name = field_name.to_string();
        self.run(false, move |core| core.remove_index(&field_name))
    }

    // ── Persistence ─────────────────────────────────────────────

    /// Rewrite the data file to its minimal form (crash-safe).
    pub fn compact_datafile(&self) -> Result<(), DbError> {
        self.run(false, |core| core.compact())
    }

    /// Register an observer fired exactly once per completed compaction.
    /// Registration is immediate, ahead of any buffered operations.
    pub fn on_compaction_done(&self, listener: impl Fn() + Send + 'static) {
        self.executor.submit(
            true,
            Box::new(move |core| core.on_compaction_done(Box::new(listener))),
        );
    }

    /// Compact periodically. Intervals shorter than 5 seconds are clamped.
    pub fn set_autocompaction_interval(&self, interval: Duration) {
        let handle = sweep::spawn(Arc::clone(&self.executor), interval);
        let mut slot = match self.autocompaction.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut previous) = slot.replace(handle) {
            previous.stop();
        }
    }

    /// Stop periodic compaction.
    pub fn stop_autocompaction(&self) {
        let mut slot = match self.autocompaction.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut handle) = slot.take() {
            handle.stop();
        }
    }
}

impl Drop for Datastore {
    fn drop(&mut self) {
        self.stop_autocompaction();
    }
}
