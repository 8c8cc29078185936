//! Atomic file operations with ACID guarantees.
//!
//! Provides a thin layer for safe concurrent access to the JSON and TOML
//! files that make up the data directory.

use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during atomic file operations.
#[derive(Debug, Error)]
pub enum AtomicFileError {
    /// File I/O error.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    /// File locking error.
    #[error("Lock error: {0}")]
    Lock(String),
}

impl AtomicFileError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<AtomicFileError> for confidant_core::ConfidantError {
    fn from(err: AtomicFileError) -> Self {
        match err {
            AtomicFileError::Io { .. } | AtomicFileError::Lock(_) => Self::io(err.to_string()),
            AtomicFileError::Json(e) => e.into(),
            AtomicFileError::TomlDe(e) => e.into(),
            AtomicFileError::TomlSer(e) => e.into(),
        }
    }
}

/// On-disk encoding of an [`AtomicFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    fn encode<T: Serialize>(self, data: &T) -> Result<String, AtomicFileError> {
        Ok(match self {
            Self::Json => serde_json::to_string_pretty(data)?,
            Self::Toml => toml::to_string_pretty(data)?,
        })
    }

    fn decode<T: DeserializeOwned>(self, content: &str) -> Result<T, AtomicFileError> {
        Ok(match self {
            Self::Json => serde_json::from_str(content)?,
            Self::Toml => toml::from_str(content)?,
        })
    }
}

/// A handle to an atomic file with ACID guarantees.
///
/// Provides:
/// - **Atomicity**: Updates are all-or-nothing via tmp file + atomic rename
/// - **Isolation**: An exclusive lock on a sibling `.lock` file serializes writers
/// - **Durability**: Explicit fsync before rename
pub struct AtomicFile<T> {
    path: PathBuf,
    format: FileFormat,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for AtomicFile<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            format: self.format,
            _phantom: PhantomData,
        }
    }
}

impl<T> AtomicFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: PathBuf, format: FileFormat) -> Self {
        Self {
            path,
            format,
            _phantom: PhantomData,
        }
    }

    pub fn json(path: PathBuf) -> Self {
        Self::new(path, FileFormat::Json)
    }

    pub fn toml(path: PathBuf) -> Self {
        Self::new(path, FileFormat::Toml)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file as text.
    ///
    /// Returns `None` if the file doesn't exist or is blank.
    pub fn load_raw(&self) -> Result<Option<String>, AtomicFileError> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AtomicFileError::io(&self.path, e)),
        }
    }

    /// Loads the file and deserializes it.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(T))`: Successfully loaded and deserialized
    /// - `Ok(None)`: File doesn't exist or is empty
    /// - `Err`: Failed to read or parse the file
    pub fn load(&self) -> Result<Option<T>, AtomicFileError> {
        self.load_raw()?
            .map(|content| self.format.decode(&content))
            .transpose()
    }

    /// Serializes `data` and writes it atomically.
    pub fn save(&self, data: &T) -> Result<(), AtomicFileError> {
        let content = self.format.encode(data)?;
        write_atomic(&self.path, content.as_bytes())
    }

    /// Returns the canonical encoding of `data` without writing it.
    pub fn encode(&self, data: &T) -> Result<String, AtomicFileError> {
        self.format.encode(data)
    }

    /// Performs a transactional update under the file lock.
    ///
    /// `f` receives the current value (or `default_value` if the file is
    /// missing). The result is written back only when `f` returns `Ok`.
    pub fn update<R, F>(&self, default_value: T, f: F) -> Result<R, AtomicFileError>
    where
        F: FnOnce(&mut T) -> Result<R, AtomicFileError>,
    {
        let _lock = self.lock()?;

        let mut data = self.load()?.unwrap_or(default_value);
        let out = f(&mut data)?;
        self.save(&data)?;

        Ok(out)
    }

    /// Acquires the exclusive lock guarding this file.
    ///
    /// Hold the returned guard across a read-modify-write.
    pub fn lock(&self) -> Result<FileLock, AtomicFileError> {
        FileLock::acquire(&self.path)
    }
}

/// Writes `content` to `path` through a temp file in the same directory.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), AtomicFileError> {
    let parent = path.parent().ok_or_else(|| {
        AtomicFileError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Path has no parent directory"),
        )
    })?;
    let file_name = path.file_name().ok_or_else(|| {
        AtomicFileError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Path has no file name"),
        )
    })?;

    fs::create_dir_all(parent).map_err(|e| AtomicFileError::io(parent, e))?;

    let tmp_path = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));
    let mut tmp_file = File::create(&tmp_path).map_err(|e| AtomicFileError::io(&tmp_path, e))?;
    tmp_file
        .write_all(content)
        .and_then(|()| tmp_file.sync_all())
        .map_err(|e| AtomicFileError::io(&tmp_path, e))?;
    drop(tmp_file);

    fs::rename(&tmp_path, path).map_err(|e| AtomicFileError::io(path, e))
}

/// An exclusive file lock, released when dropped.
///
/// The `.lock` file is never removed; waiters may already hold its inode.
pub struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, AtomicFileError> {
        let lock_path = path.with_extension("lock");

        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| AtomicFileError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| AtomicFileError::io(&lock_path, e))?;

        fs2::FileExt::lock_exclusive(&file)
            .map_err(|e| AtomicFileError::Lock(format!("Failed to acquire lock: {}", e)))?;

        Ok(FileLock { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        name: String,
        count: u32,
    }

    fn counter(count: u32) -> Counter {
        Counter {
            name: "c".to_string(),
            count,
        }
    }

    #[test]
    fn test_save_and_load_both_formats() {
        let temp_dir = TempDir::new().unwrap();
        for file in [
            AtomicFile::<Counter>::json(temp_dir.path().join("c.json")),
            AtomicFile::<Counter>::toml(temp_dir.path().join("c.toml")),
        ] {
            file.save(&counter(42)).unwrap();
            assert_eq!(file.load().unwrap(), Some(counter(42)));
        }
    }

    #[test]
    fn test_load_missing_or_blank_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("c.json");
        let file = AtomicFile::<Counter>::json(path.clone());
        assert!(file.load().unwrap().is_none());

        fs::write(&path, "  \n").unwrap();
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("c.json");
        fs::write(&path, "{not json").unwrap();

        let file = AtomicFile::<Counter>::json(path);
        assert!(matches!(file.load(), Err(AtomicFileError::Json(_))));
        assert_eq!(file.load_raw().unwrap().as_deref(), Some("{not json"));
    }

    #[test]
    fn test_update_returns_closure_result() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicFile::<Counter>::toml(temp_dir.path().join("nested/c.toml"));

        let seen = file
            .update(counter(0), |c| {
                c.count += 10;
                Ok(c.count)
            })
            .unwrap();
        assert_eq!(seen, 10);

        file.update(counter(0), |c| {
            c.count += 5;
            Ok(())
        })
        .unwrap();
        assert_eq!(file.load().unwrap().unwrap().count, 15);
    }

    #[test]
    fn test_failed_update_leaves_file_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicFile::<Counter>::json(temp_dir.path().join("c.json"));
        file.save(&counter(1)).unwrap();

        let result: Result<(), _> = file.update(counter(0), |c| {
            c.count = 99;
            Err(AtomicFileError::Lock("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(file.load().unwrap(), Some(counter(1)));
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("c.json");
        let file = AtomicFile::<Counter>::json(path.clone());
        file.save(&counter(3)).unwrap();

        assert!(!temp_dir.path().join(".c.json.tmp").exists());
        assert!(path.exists());
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("c.json");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let file = AtomicFile::<Counter>::json(path.clone());
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        file.update(counter(0), |c| {
                            c.count += 1;
                            Ok(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let file = AtomicFile::<Counter>::json(path);
        assert_eq!(file.load().unwrap().unwrap().count, 80);
    }
}
