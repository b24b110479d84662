//! Key-value application data store.
//!
//! The recovery loop persists its unsynced history under a single key. The
//! [`AppData`] trait abstracts over where that key lives: [`MemoryAppData`]
//! for tests and hosts without durable storage, [`FsAppData`] for one file
//! per key inside an application data directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{LyricsError, Result};
use crate::fs::FileSystem;

/// Durable string storage keyed by name.
pub trait AppData: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Read the value under `key`, or `None` if it was never set.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Whether a value is stored under `key`.
    fn exists(&self, key: &str) -> bool;

    /// Remove the value under `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory app data for testing.
///
/// Clones share the same underlying map, so a test can keep a handle while
/// the code under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryAppData {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryAppData {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.read().unwrap().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.read().unwrap().is_empty()
    }
}

impl AppData for MemoryAppData {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write().unwrap();
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.read().unwrap();
        Ok(values.get(key).cloned())
    }

    fn exists(&self, key: &str) -> bool {
        self.values.read().unwrap().contains_key(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.write().unwrap();
        values.remove(key);
        Ok(())
    }
}

/// App data stored as `<dir>/<key>.json`, one file per key.
pub struct FsAppData<FS: FileSystem> {
    fs: FS,
    dir: PathBuf,
}

impl<FS: FileSystem> FsAppData<FS> {
    /// Store keys under `dir` using `fs`.
    pub fn new(fs: FS, dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            dir: dir.into(),
        }
    }

    /// Directory holding the key files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl<FS: FileSystem + Send + Sync> AppData for FsAppData<FS> {
    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        self.fs
            .create_dir_all(&self.dir)
            .and_then(|_| self.fs.write_file(&path, value))
            .map_err(|source| LyricsError::FileWrite { path, source })
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !self.fs.exists(&path) {
            return Ok(None);
        }
        self.fs
            .read_to_string(&path)
            .map(Some)
            .map_err(|source| LyricsError::FileRead { path, source })
    }

    fn exists(&self, key: &str) -> bool {
        self.fs.exists(&self.path_for(key))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if !self.fs.exists(&path) {
            return Ok(());
        }
        self.fs
            .delete_file(&path)
            .map_err(|source| LyricsError::FileWrite { path, source })
    }
}
