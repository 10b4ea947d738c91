//! Mutual exclusion on top of a [`MemoryStore`].
//!
//! A lock is a key under `LOCKING/LOCKER/<name>` whose value is the holder token.
//! Acquisition is a conditional create followed by an expiry, so a crashed holder
//! frees the lock after `ttl_ms`. When retries run out the key is overwritten:
//! the caller gets the lock, `LockAcquisition::stolen` is set and the takeover is logged.
//! Release is compare-and-delete, a holder whose lock was taken over cannot remove the new holder's key.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use cadflow_model::{DurationMs, ErrorKind};

use crate::{
    metrics::{MetricsBackend, NoopMetrics},
    store::{MemoryStore, StoreError, StoreKey},
    system::holder_prefix,
};

const LOCK_DOMAIN: &str = "LOCKING";
const LOCK_SUBDOMAIN: &str = "LOCKER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Conditional-create attempts before the key is force-overwritten.
    pub max_attempts: u32,
    pub retry_delay_ms: DurationMs,
    pub ttl_ms: DurationMs,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            retry_delay_ms: 1_000,
            ttl_ms: 30_000,
        }
    }
}

impl LockConfig {
    #[inline]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {lock}: {source}")]
    Store {
        lock: String,
        #[source]
        source: StoreError,
    },
    #[error("lock {lock}: could not set expiry")]
    ExpiryNotSet { lock: String },
    #[error("lock {lock} is held by another owner")]
    Busy { lock: String },
    #[error("lock {lock} was lost before release")]
    Lost { lock: String },
}

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LockError::Store { .. } | LockError::ExpiryNotSet { .. } => ErrorKind::Store,
            LockError::Busy { .. } | LockError::Lost { .. } => ErrorKind::Contention,
        }
    }

    fn store(lock: &str, source: StoreError) -> Self {
        LockError::Store {
            lock: lock.to_string(),
            source,
        }
    }
}

/// Proof of ownership returned by a successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    lock: String,
    holder: String,
}

impl LockToken {
    pub fn lock(&self) -> &str {
        &self.lock
    }

    /// `<hostname>-<uuid>` value stored under the lock key.
    pub fn holder(&self) -> &str {
        &self.holder
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.lock, self.holder)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockAcquisition {
    pub token: LockToken,
    /// The key was force-overwritten after `max_attempts` conflicts.
    pub stolen: bool,
    pub attempts: u32,
}

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn MemoryStore>,
    config: LockConfig,
    metrics: Arc<dyn MetricsBackend>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn MemoryStore>, config: LockConfig) -> Self {
        Self {
            store,
            config,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsBackend>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    fn key(lock: &str) -> StoreKey {
        StoreKey::new(LOCK_DOMAIN, LOCK_SUBDOMAIN, lock)
    }

    fn new_token(lock: &str) -> LockToken {
        LockToken {
            lock: lock.to_string(),
            holder: format!("{}-{}", holder_prefix(), uuid::Uuid::new_v4()),
        }
    }

    /// Single conditional create. Returns [`LockError::Busy`] if a live holder exists.
    pub async fn try_acquire(&self, lock: &str) -> Result<LockToken, LockError> {
        let key = Self::key(lock);
        let token = Self::new_token(lock);

        let created = self
            .store
            .set_if_absent(&key, &token.holder)
            .await
            .map_err(|e| LockError::store(lock, e))?;
        if !created {
            return Err(LockError::Busy {
                lock: lock.to_string(),
            });
        }

        self.arm(&key, &token).await?;
        self.metrics.lock_acquired(false);
        debug!(lock, holder = %token.holder, "lock acquired");
        Ok(token)
    }

    /// Acquire `lock`, waiting `retry_delay_ms` between conflicting attempts.
    ///
    /// Never reports contention: after `max_attempts` conflicts the key is overwritten.
    pub async fn acquire(&self, lock: &str) -> Result<LockAcquisition, LockError> {
        let key = Self::key(lock);
        let token = Self::new_token(lock);
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let created = self
                .store
                .set_if_absent(&key, &token.holder)
                .await
                .map_err(|e| LockError::store(lock, e))?;

            if created {
                self.arm(&key, &token).await?;
                self.metrics.lock_acquired(false);
                debug!(lock, holder = %token.holder, attempt, "lock acquired");
                return Ok(LockAcquisition {
                    token,
                    stolen: false,
                    attempts: attempt,
                });
            }

            trace!(lock, attempt, max_attempts, "lock busy");
            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }

        let previous = self.store.get(&key).await.ok().flatten();
        warn!(
            lock,
            holder = %token.holder,
            previous = previous.as_deref().unwrap_or("<expired>"),
            attempts = max_attempts,
            "lock retries exhausted, taking over"
        );

        self.store
            .set_many(&[(key.clone(), token.holder.clone())])
            .await
            .map_err(|e| LockError::store(lock, e))?;
        self.arm(&key, &token).await?;
        self.metrics.lock_acquired(true);

        Ok(LockAcquisition {
            token,
            stolen: true,
            attempts: max_attempts,
        })
    }

    /// Set the TTL on a freshly written key; undo the write if that fails.
    async fn arm(&self, key: &StoreKey, token: &LockToken) -> Result<(), LockError> {
        match self.store.expire(key, self.config.ttl()).await {
            Ok(true) => Ok(()),
            outcome => {
                if let Err(e) = &outcome {
                    warn!(lock = %token.lock, error = %e, "failed to set lock expiry");
                } else {
                    warn!(lock = %token.lock, "lock key vanished before expiry was set");
                }
                if let Err(e) = self.store.delete_if_equals(key, &token.holder).await {
                    warn!(lock = %token.lock, error = %e, "failed to clean up unarmed lock");
                }
                Err(LockError::ExpiryNotSet {
                    lock: token.lock.clone(),
                })
            }
        }
    }

    /// Delete the lock key if it still carries `token`.
    pub async fn release(&self, token: &LockToken) -> Result<(), LockError> {
        let key = Self::key(&token.lock);
        match self.store.delete_if_equals(&key, &token.holder).await {
            Ok(true) => {
                debug!(lock = %token.lock, "lock released");
                Ok(())
            }
            Ok(false) => {
                self.metrics.lock_release_failed();
                warn!(lock = %token.lock, holder = %token.holder, "lock expired or taken over before release");
                Err(LockError::Lost {
                    lock: token.lock.clone(),
                })
            }
            Err(e) => {
                self.metrics.lock_release_failed();
                Err(LockError::store(&token.lock, e))
            }
        }
    }

    /// Run `action` while holding `lock`.
    ///
    /// A failed release discards the action's result and returns the release error.
    pub async fn with_lock<F, Fut, T>(&self, lock: &str, action: F) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let acquired = self.acquire(lock).await?;
        let out = action().await;
        self.release(&acquired.token).await?;
        Ok(out)
    }
}
