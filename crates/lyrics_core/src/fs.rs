use std::io::{Error, ErrorKind, Result};
use std::path::{Path, PathBuf};

/// Abstraction over filesystem operations
/// Allows for different implementations: real filesystem, in-memory (for WASM and tests), etc.
pub trait FileSystem {
    /// Reads a whole file as bytes (save containers are binary)
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>>;

    /// Writes bytes to a file, replacing any existing content
    fn write_binary(&self, path: &Path, content: &[u8]) -> Result<()>;

    /// Deletes a file
    fn delete_file(&self, path: &Path) -> Result<()>;

    /// Checks if a file exists
    fn exists(&self, path: &Path) -> bool;

    /// Creates a directory and all parent directories
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Reads the file content as UTF-8 text
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read_binary(path)?;
        String::from_utf8(bytes).map_err(|e| Error::new(ErrorKind::InvalidData, e))
    }

    /// Writes text to a file
    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        self.write_binary(path, content.as_bytes())
    }
}

// Blanket implementation for references to FileSystem
impl<T: FileSystem> FileSystem for &T {
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        (*self).read_binary(path)
    }

    fn write_binary(&self, path: &Path, content: &[u8]) -> Result<()> {
        (*self).write_binary(path, content)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        (*self).delete_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (*self).exists(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        (*self).create_dir_all(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        (*self).read_to_string(path)
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        (*self).write_file(path, content)
    }
}

// ============================================================================
// RealFileSystem - Only available on non-WASM targets
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
use std::fs;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Copy)]
/// This is a simple filesystem implementation that simply maps to std::fs methods
pub struct RealFileSystem;

#[cfg(not(target_arch = "wasm32"))]
impl FileSystem for RealFileSystem {
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_binary(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
    }

}

// ============================================================================
// InMemoryFileSystem - Available on all targets, including WASM
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// An in-memory filesystem implementation
/// Useful for WASM targets where real filesystem access is not available
/// Also useful for testing
#[derive(Clone, Default)]
pub struct InMemoryFileSystem {
    /// Files stored as path -> bytes
    files: Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>,
    /// Directories that exist (implicitly created when files are added)
    directories: Arc<RwLock<HashSet<PathBuf>>>,
}

impl InMemoryFileSystem {
    /// Create a new empty in-memory filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Helper to normalize paths (remove . and .. components where possible)
    fn normalize_path(path: &Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            use std::path::Component;
            match component {
                Component::CurDir => {} // Skip "."
                Component::ParentDir => {
                    // Go up one level if possible
                    if !components.is_empty() {
                        components.pop();
                    }
                }
                c => components.push(c),
            }
        }
        components.iter().collect()
    }
}

impl FileSystem for InMemoryFileSystem {
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        let normalized = Self::normalize_path(path);
        let files = self.files.read().unwrap();
        files
            .get(&normalized)
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("File not found: {:?}", path)))
    }

    fn write_binary(&self, path: &Path, content: &[u8]) -> Result<()> {
        let normalized = Self::normalize_path(path);

        // Ensure parent directories exist
        if let Some(parent) = normalized.parent() {
            self.create_dir_all(parent)?;
        }

        let mut files = self.files.write().unwrap();
        files.insert(normalized, content.to_vec());
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        let normalized = Self::normalize_path(path);
        let mut files = self.files.write().unwrap();
        if files.remove(&normalized).is_some() {
            return Ok(());
        }

        Err(Error::new(
            ErrorKind::NotFound,
            format!("File not found: {:?}", path),
        ))
    }

    fn exists(&self, path: &Path) -> bool {
        let normalized = Self::normalize_path(path);
        let files = self.files.read().unwrap();
        let dirs = self.directories.read().unwrap();
        files.contains_key(&normalized) || dirs.contains(&normalized)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let normalized = Self::normalize_path(path);
        let mut dirs = self.directories.write().unwrap();

        // Add the directory and all parent directories
        let mut current = normalized.as_path();
        loop {
            if !current.as_os_str().is_empty() {
                dirs.insert(current.to_path_buf());
            }
            match current.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    current = parent;
                }
                _ => break,
            }
        }

        Ok(())
    }
}
