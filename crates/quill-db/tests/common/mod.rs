use std::path::{Path, PathBuf};

use quill_db::{Datastore, MemoryStorage, Options};

#[allow(dead_code)]
pub const DATAFILE: &str = "test.db";

/// A purely in-memory datastore.
#[allow(dead_code)]
pub fn mem_db() -> Datastore {
    Datastore::in_memory()
}

/// A loaded datastore persisting into shared in-memory storage, so tests
/// can inspect (and corrupt) the data file.
#[allow(dead_code)]
pub fn file_db() -> (Datastore, MemoryStorage, PathBuf) {
    let storage = MemoryStorage::new();
    let path = PathBuf::from(DATAFILE);
    let db = Datastore::open(
        Options::new()
            .filename(&path)
            .storage(storage.clone())
            .autoload(true),
    )
    .unwrap();
    (db, storage, path)
}

/// Reopen a datastore over existing storage, replaying its data file.
#[allow(dead_code)]
pub fn reopen(storage: &MemoryStorage, path: &Path) -> Datastore {
    Datastore::open(
        Options::new()
            .filename(path)
            .storage(storage.clone())
            .autoload(true),
    )
    .unwrap()
}

/// The non-empty lines currently in the data file.
#[allow(dead_code)]
pub fn file_lines(storage: &MemoryStorage, path: &Path) -> Vec<String> {
    storage
        .contents(path)
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
