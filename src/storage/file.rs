//! JSON file backed client storage.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use tempfile::NamedTempFile;

use crate::error::{BabError, BabResult};
use crate::storage::{ClientStorage, StoredValue};

/// Client storage persisted as a single JSON document.
///
/// Every write rewrites the whole file through a uniquely named temporary
/// sibling and a rename, so a crash never leaves a truncated document behind.
/// Writes from concurrent callers are serialized.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: DashMap<String, StoredValue>,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Open (or create) the storage file. Expired entries are dropped on load.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// the parent directory cannot be created.
    pub fn open(path: impl AsRef<Path>) -> BabResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let entries = DashMap::new();
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if !raw.trim().is_empty() {
                let stored: BTreeMap<String, StoredValue> = serde_json::from_str(&raw)?;
                for (key, value) in stored {
                    if !value.is_expired() {
                        entries.insert(key, value);
                    }
                }
            }
        }

        tracing::debug!(
            "Opened client storage at {} ({} entries)",
            path.display(),
            entries.len()
        );
        Ok(Self {
            path,
            entries,
            write_lock: Mutex::new(()),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn flush(&self) -> BabResult<()> {
        let _write = self
            .write_lock
            .lock()
            .map_err(|_| BabError::Storage("storage write lock poisoned".to_string()))?;

        let snapshot: BTreeMap<String, StoredValue> = self
            .entries
            .iter()
            .filter(|e| !e.is_expired())
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut tmp = NamedTempFile::new_in(self.dir())?;
        tmp.write_all(&serde_json::to_vec_pretty(&snapshot)?)?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

impl ClientStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).and_then(|entry| {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                None
            } else {
                Some(entry.value.clone())
            }
        })
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BabResult<()> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value, ttl)?);
        self.flush()
    }

    fn remove(&self, key: &str) -> BabResult<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir();
        let Ok(dir) = dir else {
            panic!("tempdir");
        };
        let path = dir.path().join("nested").join("storage.json");

        let storage = FileStorage::open(&path);
        assert!(storage.is_ok_and(|s| {
            s.set("current_chat", "{\"agentId\":\"a\"}", None).is_ok()
                && s.set("gone", "x", Some(Duration::ZERO)).is_ok()
        }));

        let reopened = FileStorage::open(&path);
        let Ok(reopened) = reopened else {
            panic!("reopen");
        };
        assert_eq!(
            reopened.get("current_chat").as_deref(),
            Some("{\"agentId\":\"a\"}")
        );
        assert!(reopened.get("gone").is_none());

        let leftovers = std::fs::read_dir(path.parent().unwrap_or(dir.path()))
            .map(|entries| entries.count())
            .unwrap_or_default();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_concurrent_writers_all_succeed() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let path = dir.path().join("storage.json");
        let Ok(storage) = FileStorage::open(&path) else {
            panic!("open");
        };

        let failures: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|worker| {
                    let storage = &storage;
                    scope.spawn(move || {
                        (0..50)
                            .filter(|i| {
                                storage
                                    .set(&format!("key_{worker}_{i}"), "v", None)
                                    .is_err()
                            })
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap_or(usize::MAX)).sum()
        });
        assert_eq!(failures, 0);

        let Ok(reopened) = FileStorage::open(&path) else {
            panic!("reopen");
        };
        assert_eq!(reopened.get("key_7_49").as_deref(), Some("v"));
        assert_eq!(reopened.get("key_0_0").as_deref(), Some("v"));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("tempdir");
        };
        let path = dir.path().join("storage.json");
        assert!(std::fs::write(&path, "{not json").is_ok());
        assert!(FileStorage::open(&path).is_err());
    }
}
