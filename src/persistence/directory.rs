//! Storage backends for index persistence.
//!
//! All persistence code talks to a [`Directory`]. The concrete backends delegate to
//! `durability::storage`, which owns file creation, atomic publish and renames;
//! this module only adapts its errors into [`PersistenceError`].

use crate::persistence::error::{PersistenceError, PersistenceResult};
use durability::storage::Directory as DurabilityDirectory;
use std::io::{Read, Write};
use std::path::PathBuf;

/// Filesystem-like directory abstraction. Paths are `/`-separated and relative.
pub trait Directory: Send + Sync {
    fn create_file(&self, path: &str) -> PersistenceResult<Box<dyn Write>>;
    fn open_file(&self, path: &str) -> PersistenceResult<Box<dyn Read>>;
    fn exists(&self, path: &str) -> bool;
    fn delete(&self, path: &str) -> PersistenceResult<()>;
    fn atomic_rename(&self, from: &str, to: &str) -> PersistenceResult<()>;
    fn create_dir_all(&self, path: &str) -> PersistenceResult<()>;
    fn list_dir(&self, path: &str) -> PersistenceResult<Vec<String>>;
    /// Publish `data` at `path` so readers see either the old file or all of `data`.
    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()>;
    fn file_path(&self, path: &str) -> Option<PathBuf>;
}

/// In-memory directory for tests and ephemeral processes; clones share files.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: durability::storage::MemoryDirectory,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            inner: durability::storage::MemoryDirectory::new(),
        }
    }
}

impl Directory for MemoryDirectory {
    fn create_file(&self, path: &str) -> PersistenceResult<Box<dyn Write>> {
        self.inner
            .create_file(path)
            .map(|w| w as Box<dyn Write>)
            .map_err(PersistenceError::from)
    }
    fn open_file(&self, path: &str) -> PersistenceResult<Box<dyn Read>> {
        self.inner
            .open_file(path)
            .map(|r| r as Box<dyn Read>)
            .map_err(PersistenceError::from)
    }
    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }
    fn delete(&self, path: &str) -> PersistenceResult<()> {
        self.inner.delete(path).map_err(PersistenceError::from)
    }
    fn atomic_rename(&self, from: &str, to: &str) -> PersistenceResult<()> {
        self.inner
            .atomic_rename(from, to)
            .map_err(PersistenceError::from)
    }
    fn create_dir_all(&self, path: &str) -> PersistenceResult<()> {
        self.inner
            .create_dir_all(path)
            .map_err(PersistenceError::from)
    }
    fn list_dir(&self, path: &str) -> PersistenceResult<Vec<String>> {
        self.inner.list_dir(path).map_err(PersistenceError::from)
    }
    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()> {
        self.inner
            .atomic_write(path, data)
            .map_err(PersistenceError::from)
    }
    fn file_path(&self, path: &str) -> Option<PathBuf> {
        self.inner.file_path(path)
    }
}

/// Directory rooted at a filesystem path.
pub struct FsDirectory {
    root: PathBuf,
    inner: durability::storage::FsDirectory,
}

impl FsDirectory {
    /// Open a directory rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let root = root.into();
        let inner = durability::storage::FsDirectory::new(root.clone())
            .map_err(PersistenceError::from)?;
        Ok(Self { root, inner })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

impl Directory for FsDirectory {
    fn create_file(&self, path: &str) -> PersistenceResult<Box<dyn Write>> {
        self.inner
            .create_file(path)
            .map(|w| w as Box<dyn Write>)
            .map_err(PersistenceError::from)
    }
    fn open_file(&self, path: &str) -> PersistenceResult<Box<dyn Read>> {
        self.inner
            .open_file(path)
            .map(|r| r as Box<dyn Read>)
            .map_err(PersistenceError::from)
    }
    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }
    fn delete(&self, path: &str) -> PersistenceResult<()> {
        self.inner.delete(path).map_err(PersistenceError::from)
    }
    fn atomic_rename(&self, from: &str, to: &str) -> PersistenceResult<()> {
        self.inner
            .atomic_rename(from, to)
            .map_err(PersistenceError::from)
    }
    fn create_dir_all(&self, path: &str) -> PersistenceResult<()> {
        self.inner
            .create_dir_all(path)
            .map_err(PersistenceError::from)
    }
    fn list_dir(&self, path: &str) -> PersistenceResult<Vec<String>> {
        self.inner.list_dir(path).map_err(PersistenceError::from)
    }
    fn atomic_write(&self, path: &str, data: &[u8]) -> PersistenceResult<()> {
        self.inner
            .atomic_write(path, data)
            .map_err(PersistenceError::from)
    }
    fn file_path(&self, path: &str) -> Option<PathBuf> {
        self.inner.file_path(path)
    }
}
