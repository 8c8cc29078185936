//! Durable client-side key/value storage.
//!
//! Storage is best-effort: failures are logged and otherwise ignored, so a
//! broken disk degrades to "batches do not survive a restart".

use confidant_infrastructure::storage::AtomicFile;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

pub trait ClientStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Process-local storage. Lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl ClientStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// A JSON object on disk, one entry per key.
///
/// Every call goes to disk under the file lock, so several processes can
/// share one file.
#[derive(Clone)]
pub struct FileStorage {
    file: AtomicFile<BTreeMap<String, String>>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: AtomicFile::json(path.into()),
        }
    }

    /// Read-modify-write under the lock. An unreadable file is replaced.
    fn modify(&self, key: &str, f: impl FnOnce(&mut BTreeMap<String, String>)) {
        let result = self.file.lock().and_then(|_lock| {
            let mut values = self
                .file
                .load()
                .unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "client storage is unreadable, starting over");
                    None
                })
                .unwrap_or_default();
            f(&mut values);
            self.file.save(&values)
        });
        if let Err(err) = result {
            tracing::warn!(key, path = %self.file.path().display(), error = %err, "client storage write failed");
        }
    }
}

impl ClientStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        match self.file.load() {
            Ok(values) => values.and_then(|mut values| values.remove(key)),
            Err(err) => {
                tracing::warn!(key, error = %err, "client storage read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        self.modify(key, |values| {
            values.insert(key.to_string(), value.to_string());
        });
    }

    fn remove(&self, key: &str) {
        self.modify(key, |values| {
            values.remove(key);
        });
    }
}
