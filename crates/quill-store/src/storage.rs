use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// The filesystem capability the database core consumes.
///
/// Implementations must provide an atomic append, a crash-safe whole-file
/// rewrite, and recovery from a rewrite that was interrupted between writing
/// the temporary sibling and renaming it into place.
pub trait Storage: Send {
    /// Whether a datafile exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Create the directory that will contain `path`, if needed.
    fn ensure_parent_dir(&self, path: &Path) -> Result<(), StoreError>;

    /// Repair the aftermath of a crashed rewrite:
    ///
    /// - target present: nothing to do (a stale sibling is overwritten by the
    ///   next rewrite),
    /// - target missing but the `~` sibling present: the crash happened after
    ///   the sibling was fully written, so rename it into place,
    /// - both missing: create an empty target.
    fn ensure_datafile_integrity(&self, path: &Path) -> Result<(), StoreError>;

    /// Read the whole datafile.
    fn read_to_string(&self, path: &Path) -> Result<String, StoreError>;

    /// Append `data` to the datafile in a single call.
    fn append(&self, path: &Path, data: &str) -> Result<(), StoreError>;

    /// Replace the datafile contents so that a crash at any point leaves
    /// either the old or the new contents recoverable.
    fn crash_safe_write(&self, path: &Path, data: &str) -> Result<(), StoreError>;
}

/// The temporary sibling used by crash-safe rewrites: `<target>~`.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("~");
    PathBuf::from(name)
}
