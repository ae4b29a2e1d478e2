//! In-process client storage.

use std::time::Duration;

use dashmap::DashMap;

use crate::error::BabResult;
use crate::storage::{ClientStorage, StoredValue};

/// Thread-safe in-memory storage with per-entry expiry.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, StoredValue>,
}

impl MemoryStorage {
    /// Create an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    /// Whether no live entries remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClientStorage for MemoryStorage {
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
        Ok(())
    }

    fn remove(&self, key: &str) -> BabResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
