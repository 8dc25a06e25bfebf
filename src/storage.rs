//! Durable entry storage shared by every store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Manages the on-disk layout of the named entries.
///
/// The layout follows this structure:
/// ```text
/// <base_dir>/
///     users.json
///     currentUser.json
///     internships.json
///     applications.json
/// ```
///
/// Each entry is an independent JSON text blob that is always rewritten as a
/// whole. Any number of processes may open the same base directory; none of
/// them locks it.
///
/// `StorageLayout` is cheap to clone (it wraps a single `PathBuf`).
#[derive(Debug, Clone)]
pub struct StorageLayout {
    base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new `StorageLayout` rooted at the given base directory.
    ///
    /// # Arguments
    ///
    /// * `base_dir` - Root directory for all entries.
    ///   The directory does not need to exist yet; it will be created
    ///   lazily by the first [`write`](StorageLayout::write).
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the root directory of this layout.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the path of a named entry.
    ///
    /// # Returns
    ///
    /// `<base_dir>/<entry>.json`
    pub fn entry_path(&self, entry: &str) -> PathBuf {
        self.base_dir.join(format!("{entry}.json"))
    }

    /// The entry a path in the base directory belongs to.
    ///
    /// # Returns
    ///
    /// `Some("users")` for `<base_dir>/users.json`; `None` for temp files
    /// and anything outside the base directory.
    pub fn entry_name<'a>(&self, path: &'a Path) -> Option<&'a str> {
        if path.parent()? != self.base_dir {
            return None;
        }
        path.file_name()?.to_str()?.strip_suffix(".json")
    }

    /// Read the raw bytes of an entry.
    ///
    /// # Returns
    ///
    /// `Ok(None)` if the entry has never been written (or was removed).
    ///
    /// # Errors
    ///
    /// Returns `io::Error` for I/O failures other than file-not-found.
    pub fn read(&self, entry: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.entry_path(entry)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace an entry atomically.
    ///
    /// Writes to `<entry>.json.tmp` in the base directory, then renames it
    /// over `<entry>.json`, so readers in other processes never observe a
    /// partially-written entry.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if directory creation, file writing, or renaming fails.
    pub fn write(&self, entry: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        let path = self.entry_path(entry);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Delete an entry. Removing an absent entry is not an error.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` for I/O failures other than file-not-found.
    pub fn remove(&self, entry: &str) -> io::Result<()> {
        match fs::remove_file(self.entry_path(entry)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// SHA-256 of an entry's contents.
pub(crate) type EntryDigest = [u8; 32];

/// Fingerprint of an entry's contents, `None` for an absent entry.
///
/// Stores remember the digest of what they last wrote or loaded and compare
/// it against the file to tell foreign writes from their own.
pub(crate) fn digest(bytes: Option<&[u8]>) -> Option<EntryDigest> {
    bytes.map(|b| Sha256::digest(b).into())
}
