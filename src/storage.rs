//! Source storage and content fingerprints.
//!
//! The engine never touches the file system directly; every read and write
//! goes through a [`SourceStorage`]. Paths are relative to the storage root.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use walkdir::WalkDir;

use crate::error::{RefactorError, Result};

/// SHA-256 of a file's content, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprints a piece of text.
    pub fn of(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// Read/write access to source text.
pub trait SourceStorage: Send + Sync {
    /// Lists every file in the storage, sorted.
    fn files(&self) -> Result<Vec<PathBuf>>;

    /// Returns true if the file exists.
    fn exists(&self, path: &Path) -> bool;

    /// Reads a file.
    fn read(&self, path: &Path) -> Result<String>;

    /// Writes a file, creating it (and its parent directories) if needed.
    ///
    /// Failures are reported as [`RefactorError::StorageFailure`].
    fn write(&self, path: &Path, content: &str) -> Result<()>;

    /// Deletes a file.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Fingerprints the current content of a file.
    fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        Ok(Fingerprint::of(&self.read(path)?))
    }
}

/// In-memory storage.
///
/// Supports read-only paths and write-fault injection so callers can
/// exercise rollback.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<PathBuf, String>>,
    read_only: RwLock<HashSet<PathBuf>>,
    writes_before_failure: Mutex<Option<usize>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file (builder style).
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    /// Adds or replaces a file without going through write checks.
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), content.into());
    }

    /// Marks a file as read-only; writes and deletes of it fail.
    pub fn set_read_only(&self, path: impl Into<PathBuf>) {
        self.read_only
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into());
    }

    /// Lets `count` more mutations succeed, then fails the next one.
    ///
    /// The failure fires once, so a rollback after it can still write.
    pub fn fail_writes_after(&self, count: usize) {
        *self
            .writes_before_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(count);
    }

    /// Returns a copy of every file.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, String> {
        self.files.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn check_mutation(&self, path: &Path) -> Result<()> {
        if self
            .read_only
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(path)
        {
            return Err(RefactorError::storage(path, "file is read-only"));
        }

        let mut budget = self
            .writes_before_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match budget.as_mut() {
            Some(0) => {
                *budget = None;
                Err(RefactorError::storage(path, "injected write failure"))
            }
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl SourceStorage for MemoryStorage {
    fn files(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(path)
    }

    fn read(&self, path: &Path) -> Result<String> {
        self.files
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
            .ok_or_else(|| {
                RefactorError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} not found", path.display()),
                ))
            })
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        self.check_mutation(path)?;
        self.insert(path, content);
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        self.check_mutation(path)?;
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| RefactorError::storage(path, "file does not exist"))
    }
}

/// Storage backed by a workspace directory.
pub struct FsStorage {
    root: PathBuf,
    excludes: GlobSet,
}

impl FsStorage {
    /// Opens a workspace directory, skipping paths matching `exclude_patterns`.
    pub fn open(root: impl Into<PathBuf>, exclude_patterns: &[String]) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(RefactorError::InvalidConfig(format!(
                "workspace root {} is not a directory",
                root.display()
            )));
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in exclude_patterns {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            root,
            excludes: builder.build()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

impl SourceStorage for FsStorage {
    fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| RefactorError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(p) => p.to_path_buf(),
                Err(_) => continue,
            };
            if self.excludes.is_match(&relative) {
                continue;
            }
            files.push(relative);
        }
        files.sort();
        Ok(files)
    }

    fn exists(&self, path: &Path) -> bool {
        self.full_path(path).is_file()
    }

    fn read(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(self.full_path(path))?)
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        let full = self.full_path(path);
        if let Ok(meta) = fs::metadata(&full)
            && meta.permissions().readonly()
        {
            return Err(RefactorError::storage(path, "file is read-only"));
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| RefactorError::storage(path, e))?;
        }
        fs::write(&full, content).map_err(|e| RefactorError::storage(path, e))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        fs::remove_file(self.full_path(path)).map_err(|e| RefactorError::storage(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_changes_with_content() {
        let a = Fingerprint::of("class A {}");
        assert_eq!(a, Fingerprint::of("class A {}"));
        assert_ne!(a, Fingerprint::of("class A { }"));
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_memory_storage_read_only() {
        let storage = MemoryStorage::new().with_file("A.java", "class A {}");
        storage.set_read_only("A.java");

        let err = storage.write(Path::new("A.java"), "class B {}").unwrap_err();
        assert!(matches!(err, RefactorError::StorageFailure { .. }));
        assert_eq!(storage.read(Path::new("A.java")).unwrap(), "class A {}");
    }

    #[test]
    fn test_memory_storage_fault_injection() {
        let storage = MemoryStorage::new();
        storage.fail_writes_after(1);

        storage.write(Path::new("a.txt"), "one").unwrap();
        assert!(storage.write(Path::new("b.txt"), "two").is_err());
        assert!(!storage.exists(Path::new("b.txt")));
        storage.write(Path::new("b.txt"), "two").unwrap();
    }

    #[test]
    fn test_fs_storage_lists_relative_paths() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/p")).unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("src/p/A.java"), "class A {}").unwrap();
        fs::write(dir.path().join("target/A.class"), "").unwrap();

        let storage = FsStorage::open(dir.path(), &["target/**".to_string()]).unwrap();
        assert_eq!(storage.files().unwrap(), vec![PathBuf::from("src/p/A.java")]);

        storage
            .write(Path::new("src/q/B.java"), "class B {}")
            .unwrap();
        assert!(storage.exists(Path::new("src/q/B.java")));
        storage.delete(Path::new("src/q/B.java")).unwrap();
        assert!(!storage.exists(Path::new("src/q/B.java")));
    }
}
