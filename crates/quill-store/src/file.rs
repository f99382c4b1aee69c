use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::StoreError;
use crate::storage::{temp_sibling, Storage};

/// Real-filesystem storage.
///
/// Appends are not individually fsynced; durability lands on the crash-safe
/// rewrite, which syncs the payload, the file and its directory.
#[derive(Debug, Default)]
pub struct FileStorage;

impl FileStorage {
    pub fn new() -> Self {
        FileStorage
    }
}

/// Flush directory metadata. Some platforms cannot open or fsync a
/// directory; those failures are ignored.
fn flush_dir(dir: &Path) {
    #[cfg(unix)]
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
    #[cfg(not(unix))]
    let _ = dir;
}

fn sync_existing(path: &Path) -> Result<(), StoreError> {
    if path.exists() {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        file.sync_all()?;
    }
    Ok(())
}

impl Storage for FileStorage {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn ensure_parent_dir(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn ensure_datafile_integrity(&self, path: &Path) -> Result<(), StoreError> {
        if path.exists() {
            return Ok(());
        }
        let sibling = temp_sibling(path);
        if sibling.exists() {
            fs::rename(&sibling, path)?;
        } else {
            fs::write(path, "")?;
        }
        if let Some(parent) = path.parent() {
            flush_dir(parent);
        }
        Ok(())
    }

    fn read_to_string(&self, path: &Path) -> Result<String, StoreError> {
        Ok(fs::read_to_string(path)?)
    }

    fn append(&self, path: &Path, data: &str) -> Result<(), StoreError> {
        let mut file = OpenOptions::new().append(true).create(true).open(path)?;
        file.write_all(data.as_bytes())?;
        Ok(())
    }

    fn crash_safe_write(&self, path: &Path, data: &str) -> Result<(), StoreError> {
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        flush_dir(&parent);
        sync_existing(path)?;

        let sibling = temp_sibling(path);
        let mut file = File::create(&sibling)?;
        file.write_all(data.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&sibling, path)?;
        flush_dir(&parent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_accumulates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        let storage = FileStorage::new();

        storage.append(&path, "one\n").unwrap();
        storage.append(&path, "two\n").unwrap();
        assert_eq!(storage.read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn crash_safe_write_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        let storage = FileStorage::new();

        storage.append(&path, "old\n").unwrap();
        storage.crash_safe_write(&path, "new\n").unwrap();
        assert_eq!(storage.read_to_string(&path).unwrap(), "new\n");
        assert!(!temp_sibling(&path).exists());
    }

    #[test]
    fn integrity_creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        let storage = FileStorage::new();

        storage.ensure_datafile_integrity(&path).unwrap();
        assert!(path.exists());
        assert_eq!(storage.read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn integrity_recovers_from_orphaned_sibling() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        let storage = FileStorage::new();

        // Simulate a crash after step 3 of the rewrite: only `data.db~`
        // exists, fully written.
        fs::write(temp_sibling(&path), "recovered\n").unwrap();
        storage.ensure_datafile_integrity(&path).unwrap();

        assert!(path.exists());
        assert!(!temp_sibling(&path).exists());
        assert_eq!(storage.read_to_string(&path).unwrap(), "recovered\n");
    }

    #[test]
    fn integrity_keeps_target_over_stale_sibling() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        let storage = FileStorage::new();

        fs::write(&path, "live\n").unwrap();
        fs::write(temp_sibling(&path), "stale\n").unwrap();
        storage.ensure_datafile_integrity(&path).unwrap();

        assert_eq!(storage.read_to_string(&path).unwrap(), "live\n");
    }
}
