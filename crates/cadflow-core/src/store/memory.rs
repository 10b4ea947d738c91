//! In-process [`MemoryStore`] for tests and single-node development.
//!
//! Expiry follows the tokio clock, so tests running with a paused runtime
//! can advance lock and record TTLs deterministically.
//! Individual operations can be made to fail to exercise store-failure paths.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;

use super::{MemoryStore, StoreError, StoreKey};

/// Store operation selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    SetIfAbsent,
    SetMany,
    Expire,
    Get,
    Delete,
    Keys,
}

impl StoreOp {
    fn as_str(&self) -> &'static str {
        match self {
            StoreOp::SetIfAbsent => "set_if_absent",
            StoreOp::SetMany => "set_many",
            StoreOp::Expire => "expire",
            StoreOp::Get => "get",
            StoreOp::Delete => "delete",
            StoreOp::Keys => "keys",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<StoreKey, Entry>,
    failing: HashSet<StoreOp>,
}

impl Inner {
    fn check(&self, op: StoreOp, key: &dyn std::fmt::Display) -> Result<(), StoreError> {
        if self.failing.contains(&op) {
            return Err(StoreError::Operation {
                op: op.as_str(),
                key: key.to_string(),
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn live(&mut self, key: &StoreKey, now: Instant) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `op` fail (`enabled = true`) or succeed again.
    pub fn fail_on(&self, op: StoreOp, enabled: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            if enabled {
                inner.failing.insert(op);
            } else {
                inner.failing.remove(&op);
            }
        }
    }

    /// Remaining time-to-live of `key`, `None` if absent or without expiry.
    pub fn ttl(&self, key: &StoreKey) -> Option<Duration> {
        let now = Instant::now();
        let mut inner = self.inner.lock().ok()?;
        let at = inner.live(key, now)?.expires_at?;
        Some(at.saturating_duration_since(now))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn set_if_absent(&self, key: &StoreKey, value: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        inner.check(StoreOp::SetIfAbsent, key)?;

        if inner.live(key, now).is_some() {
            return Ok(false);
        }
        inner.entries.insert(
            key.clone(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(true)
    }

    async fn set_many(&self, entries: &[(StoreKey, String)]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if let Some((key, _)) = entries.first() {
            inner.check(StoreOp::SetMany, key)?;
        }
        for (key, value) in entries {
            inner.entries.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at: None,
                },
            );
        }
        Ok(())
    }

    async fn expire(&self, key: &StoreKey, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        inner.check(StoreOp::Expire, key)?;

        match inner.live(key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, key: &StoreKey) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        inner.check(StoreOp::Get, key)?;
        Ok(inner.live(key, now).map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &StoreKey) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        inner.check(StoreOp::Delete, key)?;

        let existed = inner.live(key, now).is_some();
        inner.entries.remove(key);
        Ok(existed)
    }

    async fn delete_if_equals(&self, key: &StoreKey, expected: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        inner.check(StoreOp::Delete, key)?;

        if inner.live(key, now).is_some_and(|e| e.value == expected) {
            inner.entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn keys(&self, domain: &str, subdomain: &str) -> Result<Vec<StoreKey>, StoreError> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        inner.check(StoreOp::Keys, &format_args!("{domain}:{subdomain}:*"))?;

        inner.entries.retain(|_, e| e.is_live(now));
        let mut keys: Vec<StoreKey> = inner
            .entries
            .keys()
            .filter(|k| k.domain == domain && k.subdomain == subdomain)
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> StoreKey {
        StoreKey::new("LOCKING", "LOCKER", id)
    }

    #[tokio::test]
    async fn set_if_absent_only_creates_once() {
        let store = InMemoryStore::new();
        assert!(store.set_if_absent(&key("a"), "one").await.unwrap());
        assert!(!store.set_if_absent(&key("a"), "two").await.unwrap());
        assert_eq!(store.get(&key("a")).await.unwrap().as_deref(), Some("one"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_disappear() {
        let store = InMemoryStore::new();
        store.set_if_absent(&key("a"), "one").await.unwrap();
        assert!(store.expire(&key("a"), Duration::from_secs(30)).await.unwrap());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(store.get(&key("a")).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get(&key("a")).await.unwrap().is_none());
        assert!(store.set_if_absent(&key("a"), "two").await.unwrap());
    }

    #[tokio::test]
    async fn expire_missing_key_reports_false() {
        let store = InMemoryStore::new();
        assert!(!store.expire(&key("nope"), Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn set_many_clears_expiry() {
        let store = InMemoryStore::new();
        store.set_if_absent(&key("a"), "one").await.unwrap();
        store.expire(&key("a"), Duration::from_secs(1)).await.unwrap();
        assert!(store.ttl(&key("a")).is_some());

        store
            .set_many(&[(key("a"), "two".into()), (key("b"), "three".into())])
            .await
            .unwrap();
        assert!(store.ttl(&key("a")).is_none());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.get(&key("a")).await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn delete_if_equals_checks_value() {
        let store = InMemoryStore::new();
        store.set_if_absent(&key("a"), "token-1").await.unwrap();

        assert!(!store.delete_if_equals(&key("a"), "token-2").await.unwrap());
        assert!(store.delete_if_equals(&key("a"), "token-1").await.unwrap());
        assert!(!store.delete(&key("a")).await.unwrap());
    }

    #[tokio::test]
    async fn keys_are_scoped_and_sorted() {
        let store = InMemoryStore::new();
        store
            .set_many(&[
                (StoreKey::new("BATCH", "RECORD", "b"), "{}".into()),
                (StoreKey::new("BATCH", "RECORD", "a"), "{}".into()),
                (StoreKey::new("LOCKING", "LOCKER", "a"), "t".into()),
            ])
            .await
            .unwrap();

        let keys = store.keys("BATCH", "RECORD").await.unwrap();
        let ids: Vec<_> = keys.iter().map(|k| k.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let store = InMemoryStore::new();
        store.fail_on(StoreOp::Get, true);
        let err = store.get(&key("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::Operation { op: "get", .. }));

        store.fail_on(StoreOp::Get, false);
        assert!(store.get(&key("a")).await.unwrap().is_none());
    }
}
