use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::storage::Storage;

/// In-memory storage for tests.
///
/// Clones share the same file map, so a test can keep a handle and inspect
/// what the database wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of a file, if it exists.
    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Overwrite a file directly, bypassing the crash-safe protocol.
    pub fn seed(&self, path: &Path, data: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), data.to_string());
    }
}

impl Storage for MemoryStorage {
    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn ensure_parent_dir(&self, _path: &Path) -> Result<(), StoreError> {
        Ok(())
    }

    fn ensure_datafile_integrity(&self, path: &Path) -> Result<(), StoreError> {
        let mut files = self.files.lock().unwrap();
        files.entry(path.to_path_buf()).or_default();
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> Result<String, StoreError> {
        self.contents(path).ok_or_else(|| {
            StoreError::Io(io::Error::new(io::ErrorKind::NotFound, "no such file"))
        })
    }

    fn append(&self, path: &Path, data: &str) -> Result<(), StoreError> {
        let mut files = self.files.lock().unwrap();
        files
            .entry(path.to_path_buf())
            .or_default()
            .push_str(data);
        Ok(())
    }

    fn crash_safe_write(&self, path: &Path, data: &str) -> Result<(), StoreError> {
        self.seed(path, data);
        Ok(())
    }
}
