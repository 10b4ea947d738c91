//! Batch records persisted in the shared store, each guarded by the lock `batch:<id>`.
//!
//! Every mutation runs inside a [`BatchSession`], which owns the lock token for its lifetime.
//! Terminal records receive a retention expiry so duplicate notifications still resolve for a while.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use thiserror::Error;
use tracing::{debug, warn};

use cadflow_model::{BatchId, BatchRecord, DurationMs, ErrorKind, Stage};

use crate::{
    lock::{DistributedLock, LockError, LockToken},
    metrics::{MetricsBackend, NoopMetrics},
    store::{MemoryStore, StoreError, StoreKey},
};

const RECORD_DOMAIN: &str = "BATCH";
const RECORD_SUBDOMAIN: &str = "RECORD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateConfig {
    /// Deadline extension applied whenever a record advances.
    pub liveness_ms: DurationMs,
    pub terminal_retention_ms: DurationMs,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            liveness_ms: 600_000,
            terminal_retention_ms: 86_400_000,
        }
    }
}

impl StateConfig {
    #[inline]
    pub fn liveness(&self) -> Duration {
        Duration::from_millis(self.liveness_ms)
    }

    #[inline]
    pub fn terminal_retention(&self) -> Duration {
        Duration::from_millis(self.terminal_retention_ms)
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("batch {0} not found")]
    NotFound(BatchId),
    #[error("batch {0} already exists")]
    AlreadyExists(BatchId),
    #[error("batch {batch_id}: record is not valid json: {source}")]
    Corrupt {
        batch_id: BatchId,
        #[source]
        source: serde_json::Error,
    },
    #[error("batch {batch_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        batch_id: BatchId,
        from: Stage,
        to: Stage,
    },
}

impl StateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StateError::Lock(e) => e.kind(),
            StateError::Store(e) => e.kind(),
            StateError::Corrupt { .. } => ErrorKind::Store,
            StateError::NotFound(_)
            | StateError::AlreadyExists(_)
            | StateError::InvalidTransition { .. } => ErrorKind::Protocol,
        }
    }
}

/// Result of a stage mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: Stage, to: Stage },
    /// The record was already at or beyond the requested stage.
    Unchanged { current: Stage },
}

#[derive(Clone)]
pub struct BatchStateStore {
    store: Arc<dyn MemoryStore>,
    lock: DistributedLock,
    config: StateConfig,
    metrics: Arc<dyn MetricsBackend>,
}

impl BatchStateStore {
    pub fn new(store: Arc<dyn MemoryStore>, lock: DistributedLock, config: StateConfig) -> Self {
        Self {
            store,
            lock,
            config,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsBackend>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    fn key(batch_id: &BatchId) -> StoreKey {
        StoreKey::new(RECORD_DOMAIN, RECORD_SUBDOMAIN, batch_id.as_str())
    }

    pub fn lock_name(batch_id: &BatchId) -> String {
        format!("batch:{batch_id}")
    }

    /// Take the batch lock and return a session holding it.
    pub async fn open(&self, batch_id: &BatchId) -> Result<BatchSession<'_>, StateError> {
        let acquired = self.lock.acquire(&Self::lock_name(batch_id)).await?;
        if acquired.stolen {
            warn!(batch_id = %batch_id, "batch lock taken over, previous holder may still be running");
        }
        Ok(BatchSession {
            state: self,
            batch_id: batch_id.clone(),
            token: acquired.token,
        })
    }

    /// Read a record without taking the lock.
    pub async fn get(&self, batch_id: &BatchId) -> Result<Option<BatchRecord>, StateError> {
        let raw = self.store.get(&Self::key(batch_id)).await?;
        raw.map(|raw| decode(batch_id, &raw)).transpose()
    }

    pub async fn create(&self, record: &BatchRecord) -> Result<(), StateError> {
        let session = self.open(&record.batch_id).await?;
        let result = session.create(record).await;
        session.finish(result).await
    }

    pub async fn advance(&self, batch_id: &BatchId, next: Stage) -> Result<Transition, StateError> {
        let session = self.open(batch_id).await?;
        let result = session.advance(next).await;
        session.finish(result).await
    }

    pub async fn mark_terminal(
        &self,
        batch_id: &BatchId,
        stage: Stage,
        kind: ErrorKind,
        reason: &str,
    ) -> Result<Transition, StateError> {
        let session = self.open(batch_id).await?;
        let result = session.mark_terminal(stage, kind, reason).await;
        session.finish(result).await
    }

    /// Non-terminal batches whose liveness deadline is at or before `now`.
    ///
    /// Records that fail to decode are logged and skipped.
    pub async fn list_expired(&self, now: SystemTime) -> Result<Vec<BatchId>, StateError> {
        let keys = self.store.keys(RECORD_DOMAIN, RECORD_SUBDOMAIN).await?;

        let mut expired = Vec::new();
        for key in keys {
            let batch_id = BatchId::new(key.id.as_str());
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match decode(&batch_id, &raw) {
                Ok(record) if record.is_expired(now) => expired.push(batch_id),
                Ok(_) => {}
                Err(e) => warn!(batch_id = %batch_id, error = %e, "skipping unreadable batch record"),
            }
        }
        Ok(expired)
    }
}

fn decode(batch_id: &BatchId, raw: &str) -> Result<BatchRecord, StateError> {
    serde_json::from_str(raw).map_err(|source| StateError::Corrupt {
        batch_id: batch_id.clone(),
        source,
    })
}

/// Exclusive access to one batch record.
///
/// Must be closed with [`BatchSession::finish`] or [`BatchSession::release`];
/// a session dropped without either keeps the lock until its TTL runs out.
pub struct BatchSession<'a> {
    state: &'a BatchStateStore,
    batch_id: BatchId,
    token: LockToken,
}

impl BatchSession<'_> {
    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub async fn load(&self) -> Result<Option<BatchRecord>, StateError> {
        self.state.get(&self.batch_id).await
    }

    /// Load the record, failing with [`StateError::NotFound`] if it does not exist.
    pub async fn require(&self) -> Result<BatchRecord, StateError> {
        self.load()
            .await?
            .ok_or_else(|| StateError::NotFound(self.batch_id.clone()))
    }

    /// Persist `record`; terminal records also get the retention expiry.
    pub async fn save(&self, record: &BatchRecord) -> Result<(), StateError> {
        let key = BatchStateStore::key(&self.batch_id);
        let raw = serde_json::to_string(record).map_err(|source| StateError::Corrupt {
            batch_id: self.batch_id.clone(),
            source,
        })?;
        self.state.store.set_many(&[(key.clone(), raw)]).await?;

        if record.stage.is_terminal() {
            let retention = self.state.config.terminal_retention();
            match self.state.store.expire(&key, retention).await {
                Ok(true) => {}
                Ok(false) => warn!(batch_id = %self.batch_id, "terminal record vanished before retention was set"),
                Err(e) => warn!(batch_id = %self.batch_id, error = %e, "failed to set retention on terminal record"),
            }
        }
        debug!(batch_id = %self.batch_id, stage = %record.stage, "batch record saved");
        Ok(())
    }

    pub async fn create(&self, record: &BatchRecord) -> Result<(), StateError> {
        if self.load().await?.is_some() {
            return Err(StateError::AlreadyExists(self.batch_id.clone()));
        }
        self.save(record).await?;
        self.state.metrics.stage_entered(record.stage);
        Ok(())
    }

    /// Move along the happy path. Already at or past `next` is a no-op.
    pub async fn advance(&self, next: Stage) -> Result<Transition, StateError> {
        let mut record = self.require().await?;
        let from = record.stage;

        if matches!(next, Stage::Failed | Stage::TimedOut) {
            return Err(StateError::InvalidTransition {
                batch_id: self.batch_id.clone(),
                from,
                to: next,
            });
        }
        if from.has_reached(next) {
            return Ok(Transition::Unchanged { current: from });
        }

        record.stage = next;
        record.touch(SystemTime::now(), self.state.config.liveness());
        self.save(&record).await?;
        self.state.metrics.stage_entered(next);
        Ok(Transition::Applied { from, to: next })
    }

    /// Move to a terminal stage. Already terminal records stay as they are.
    pub async fn mark_terminal(
        &self,
        stage: Stage,
        kind: ErrorKind,
        reason: &str,
    ) -> Result<Transition, StateError> {
        let mut record = self.require().await?;
        let from = record.stage;

        if !stage.is_terminal() {
            return Err(StateError::InvalidTransition {
                batch_id: self.batch_id.clone(),
                from,
                to: stage,
            });
        }
        if from.is_terminal() {
            return Ok(Transition::Unchanged { current: from });
        }

        record.stage = stage;
        record.updated_at = SystemTime::now();
        if stage != Stage::Completed {
            record.failure_kind = Some(kind);
            record.failure_reason = Some(reason.to_string());
        }
        self.save(&record).await?;
        self.state.metrics.stage_entered(stage);
        Ok(Transition::Applied { from, to: stage })
    }

    pub async fn release(self) -> Result<(), StateError> {
        self.state.lock.release(&self.token).await?;
        Ok(())
    }

    /// Release the lock and hand back `result`.
    ///
    /// A failed release replaces a successful result; an error result wins over a release failure.
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<StateError>,
    {
        let batch_id = self.batch_id.clone();
        match (result, self.release().await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release)) => Err(E::from(release)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release)) => {
                warn!(batch_id = %batch_id, error = %release, "batch lock release failed after error");
                Err(e)
            }
        }
    }
}
