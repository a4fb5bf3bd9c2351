//! File backend: one JSON envelope per key in a local directory
//!
//! Unlike Redis, the filesystem never expires anything on its own, so every
//! read checks the envelope's expiry and deletes stale or corrupt files on the
//! spot. Writes go through a temporary file in the same directory and are
//! renamed into place, so a reader sees either the old entry or the new one.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use super::clock::Clock;
use super::envelope::{self, Freshness};
use super::error::BackendError;

/// Stores cache envelopes as files in a single directory
#[derive(Debug)]
pub struct FileBackend {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
    /// Extension of managed files, without the dot
    extension: String,
    clock: Arc<dyn Clock>,
    /// Outcome of the one-time directory creation
    ready: OnceLock<bool>,
}

impl FileBackend {
    /// Creates a backend rooted at `cache_dir`
    ///
    /// Nothing touches the filesystem until the first operation.
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            extension: extension.into(),
            clock,
            ready: OnceLock::new(),
        }
    }

    /// Directory holding the cache files
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path of the file for `file_name`
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.cache_dir.join(file_name)
    }

    /// Creates the cache directory once; a failure sticks for the backend's lifetime
    fn ensure_dir(&self) -> Result<(), BackendError> {
        let ready = *self.ready.get_or_init(|| match fs::create_dir_all(&self.cache_dir) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    dir = %self.cache_dir.display(),
                    error = %e,
                    "cannot create cache directory, file cache disabled"
                );
                false
            }
        });

        if ready {
            Ok(())
        } else {
            Err(BackendError::Unavailable(self.cache_dir.clone()))
        }
    }

    /// Writes (or overwrites) the entry for `file_name`
    pub fn put(&self, file_name: &str, envelope: &[u8]) -> Result<(), BackendError> {
        self.ensure_dir()?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".pending-")
            .suffix(".tmp")
            .tempfile_in(&self.cache_dir)?;
        tmp.write_all(envelope)?;
        tmp.flush()?;
        tmp.persist(self.path_for(file_name)).map_err(|e| e.error)?;

        debug!(file = %file_name, bytes = envelope.len(), "file cache write");
        Ok(())
    }

    /// Reads the live entry for `file_name`
    ///
    /// Missing, expired and corrupt entries all read as `None`; the latter two
    /// are deleted first.
    pub fn get(&self, file_name: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.ensure_dir()?;

        let path = self.path_for(file_name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match envelope::freshness(&bytes, self.clock.now()) {
            Ok(Freshness::Live) => {
                debug!(file = %file_name, "file cache hit");
                Ok(Some(bytes))
            }
            Ok(Freshness::Expired) => {
                debug!(file = %file_name, "file cache entry expired, removing");
                remove_if_unchanged(&path, &bytes)?;
                Ok(None)
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "corrupt cache file, removing");
                remove_if_unchanged(&path, &bytes)?;
                Ok(None)
            }
        }
    }

    /// Deletes the entry for `file_name`, if any
    pub fn delete(&self, file_name: &str) -> Result<(), BackendError> {
        self.ensure_dir()?;
        remove_if_exists(&self.path_for(file_name))
    }

    /// Deletes every managed file and returns how many were removed
    ///
    /// Only files carrying the backend's extension are touched; pending
    /// temporary files and anything else in the directory are left alone.
    pub fn clear(&self) -> Result<u64, BackendError> {
        self.ensure_dir()?;

        let mut removed = 0;
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if !path.is_file() || !self.is_managed(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "cannot remove cache file");
                }
            }
        }

        debug!(dir = %self.cache_dir.display(), removed, "file cache cleared");
        Ok(removed)
    }

    fn is_managed(&self, path: &Path) -> bool {
        path.extension().and_then(|ext| ext.to_str()) == Some(self.extension.as_str())
    }
}

/// Removes `path` only if it still holds `seen`
///
/// A writer may have renamed a fresh entry into place since `seen` was read;
/// that entry is kept. The window between the re-read and the unlink remains,
/// but a lost fresh entry there only costs a cache miss.
fn remove_if_unchanged(path: &Path, seen: &[u8]) -> Result<(), BackendError> {
    match fs::read(path) {
        Ok(current) if current == seen => remove_if_exists(path),
        Ok(_) => {
            debug!(file = %path.display(), "entry replaced concurrently, keeping it");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_exists(path: &Path) -> Result<(), BackendError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
