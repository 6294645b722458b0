//! Key/value cache for downloaded inputs.
//!
//! [`FsCache`] keeps one file per key under a directory, which is what
//! makes reruns skip the network. [`MemoryCache`] holds everything in a
//! map and exists so the loaders can be exercised without touching disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Storage for cached inputs, addressed by a flat key.
pub trait CacheStore: Send + Sync {
    /// Returns the cached bytes for `key`, or `None` on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if an existing entry cannot be read.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Persists `data` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the entry cannot be written.
    fn store(&self, key: &str, data: &[u8]) -> Result<(), CacheError>;
}

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Key would escape the cache directory.
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    /// I/O error reading or writing an entry.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// A cache backed by files in a single directory.
#[derive(Debug, Clone)]
pub struct FsCache {
    dir: PathBuf,
}

impl FsCache {
    /// Creates a cache rooted at `dir`. The directory is created lazily on
    /// the first store.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the cache entries.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an entry is stored at.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidKey`] for empty keys or keys containing
    /// path separators.
    pub fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

impl CacheStore for FsCache {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(key)?;
        if !path.exists() {
            return Ok(None);
        }

        std::fs::read(&path).map(Some).map_err(|e| CacheError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }

    fn store(&self, key: &str, data: &[u8]) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;

        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::Io {
            path: self.dir.display().to_string(),
            source: e,
        })?;

        // Write to a temp file first so an interrupted run never leaves a
        // truncated entry that the next run would treat as a hit.
        let tmp_path = self.dir.join(format!("{key}.tmp"));
        std::fs::write(&tmp_path, data).map_err(|e| CacheError::Io {
            path: tmp_path.display().to_string(),
            source: e,
        })?;

        std::fs::rename(&tmp_path, &path).map_err(|e| CacheError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        log::debug!("Cached {} bytes at {}", data.len(), path.display());
        Ok(())
    }
}

/// An in-memory cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl CacheStore for MemoryCache {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn store(&self, key: &str, data: &[u8]) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }
}
