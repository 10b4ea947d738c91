//! Shared key-value store with expiring keys.
//!
//! The store is the single source of truth for both lock entries and batch records.
//! Keys are `{domain, subdomain, identifier}` triples.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use cadflow_model::ErrorKind;

mod memory;
pub use memory::{InMemoryStore, StoreOp};

/// Scoped key: rendered as `domain:subdomain:identifier`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    pub domain: String,
    pub subdomain: String,
    pub id: String,
}

impl StoreKey {
    pub fn new(
        domain: impl Into<String>,
        subdomain: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            subdomain: subdomain.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.domain, self.subdomain, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation `{op}` failed on {key}: {reason}")]
    Operation {
        op: &'static str,
        key: String,
        reason: String,
    },
    #[error("store state poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Store
    }
}

/// Operations the orchestration core needs from the shared memory store.
///
/// Writes made through [`MemoryStore::set_many`] clear any expiry previously set on the key.
#[async_trait]
pub trait MemoryStore: Send + Sync + 'static {
    /// Create `key` only if it is absent (or expired). Returns whether the write happened.
    async fn set_if_absent(&self, key: &StoreKey, value: &str) -> Result<bool, StoreError>;

    /// Unconditionally write every entry.
    async fn set_many(&self, entries: &[(StoreKey, String)]) -> Result<(), StoreError>;

    /// Attach an expiry to an existing key. Returns `false` if the key does not exist.
    async fn expire(&self, key: &StoreKey, ttl: Duration) -> Result<bool, StoreError>;

    async fn get(&self, key: &StoreKey) -> Result<Option<String>, StoreError>;

    /// Returns whether a live key was removed.
    async fn delete(&self, key: &StoreKey) -> Result<bool, StoreError>;

    /// Delete `key` only while it still holds `expected`.
    async fn delete_if_equals(&self, key: &StoreKey, expected: &str) -> Result<bool, StoreError>;

    /// Live keys under `domain`/`subdomain`.
    async fn keys(&self, domain: &str, subdomain: &str) -> Result<Vec<StoreKey>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display() {
        let key = StoreKey::new("LOCKING", "LOCKER", "batch:b-1");
        assert_eq!(key.to_string(), "LOCKING:LOCKER:batch:b-1");
    }
}
