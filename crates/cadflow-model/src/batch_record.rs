use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::{BatchId, ErrorKind, FileRef, JobHandle, Stage};

/// Persisted progress of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub batch_id: BatchId,
    pub stage: Stage,
    /// Raw CAD file the batch was started for.
    pub source_file_ref: FileRef,
    /// Outputs reported by the most recently completed stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_refs: Vec<FileRef>,
    /// After this instant a non-terminal batch is considered abandoned.
    #[serde(with = "crate::millis")]
    pub liveness_deadline: SystemTime,
    /// Failed job submissions so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Job currently expected to be running, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_job: Option<JobHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<ErrorKind>,
    #[serde(with = "crate::millis")]
    pub created_at: SystemTime,
    #[serde(with = "crate::millis")]
    pub updated_at: SystemTime,
}

impl BatchRecord {
    /// Fresh record in [`Stage::Created`] whose deadline is `now + liveness`.
    pub fn new(
        batch_id: BatchId,
        source_file_ref: impl Into<FileRef>,
        now: SystemTime,
        liveness: Duration,
    ) -> Self {
        Self {
            batch_id,
            stage: Stage::Created,
            source_file_ref: source_file_ref.into(),
            output_refs: Vec::new(),
            liveness_deadline: now + liveness,
            retry_count: 0,
            active_job: None,
            failure_reason: None,
            failure_kind: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Non-terminal and past its liveness deadline.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        !self.stage.is_terminal() && self.liveness_deadline <= now
    }

    /// Record activity: bumps `updated_at` and pushes the deadline to `now + liveness`.
    pub fn touch(&mut self, now: SystemTime, liveness: Duration) {
        self.updated_at = now;
        self.liveness_deadline = now + liveness;
    }
}

/// Completion signal delivered by a finished job.
///
/// `stage` is the stage that just finished, e.g. `ReaderRunning` once the reader is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCompletion {
    pub batch_id: BatchId,
    pub stage: Stage,
    #[serde(default)]
    pub output_refs: Vec<FileRef>,
}
