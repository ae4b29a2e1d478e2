//! Client-side key/value storage with per-entry expiry.
//!
//! This stands in for browser cookies: small string values that outlive a
//! single session and expire after a number of days. Implementations:
//! - `memory`: process-local, used by tests and embedders
//! - `file`: JSON file, used by the command line chat
//!
//! `context` layers the typed session flags and snapshots on top.

pub mod context;
pub mod file;
pub mod memory;

pub use context::{ChatPointer, SessionContext};
pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BabError, BabResult};

/// Storage backend for client-local state.
pub trait ClientStorage: Send + Sync {
    /// Read a value. Expired entries read as absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, optionally expiring after `ttl`.
    ///
    /// # Errors
    /// Returns an error if the value cannot be persisted.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BabResult<()>;

    /// Delete a value.
    ///
    /// # Errors
    /// Returns an error if the removal cannot be persisted.
    fn remove(&self, key: &str) -> BabResult<()>;
}

/// A stored value with its expiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    /// Raw value.
    pub value: String,
    /// Absolute expiry, if any.
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    /// Build an entry expiring `ttl` from now.
    ///
    /// # Errors
    /// Returns an error if the expiry is out of range.
    pub fn new(value: &str, ttl: Option<Duration>) -> BabResult<Self> {
        let expires_at = match ttl {
            Some(ttl) => {
                let delta = TimeDelta::from_std(ttl)
                    .map_err(|e| BabError::Storage(format!("invalid ttl: {e}")))?;
                let at = Utc::now()
                    .checked_add_signed(delta)
                    .ok_or_else(|| BabError::Storage("ttl overflows the clock".to_string()))?;
                Some(at)
            }
            None => None,
        };

        Ok(Self {
            value: value.to_string(),
            expires_at,
        })
    }

    /// Whether the entry has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Whether the entry has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
