use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{BatchId, ErrorKind, FileRef, JobHandle, Stage};

/// Lifecycle event of a batch, broadcast to external consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum BatchEvent {
    /// Record created and the reader job submitted.
    Started {
        batch_id: BatchId,
        source_file_ref: FileRef,
        job: JobHandle,
    },
    /// A stage finished and the next job was submitted.
    Advanced {
        batch_id: BatchId,
        from: Stage,
        to: Stage,
        output_refs: Vec<FileRef>,
        job: JobHandle,
    },
    /// The optimizer finished; the batch is done.
    Completed {
        batch_id: BatchId,
        output_refs: Vec<FileRef>,
    },
    Failed {
        batch_id: BatchId,
        /// Stage the batch was in when it failed.
        stage: Stage,
        kind: ErrorKind,
        reason: String,
    },
    TimedOut {
        batch_id: BatchId,
        stage: Stage,
        #[serde(with = "crate::millis")]
        deadline: SystemTime,
    },
    /// A notification did not match the batch's current stage and was dropped.
    Ignored {
        batch_id: BatchId,
        reported: Stage,
        current: Stage,
    },
}

impl BatchEvent {
    /// Action type string carried on the broadcast channel.
    pub fn action_type(&self) -> &'static str {
        match self {
            BatchEvent::Started { .. } => "batch.started",
            BatchEvent::Advanced { .. } => "batch.advanced",
            BatchEvent::Completed { .. } => "batch.completed",
            BatchEvent::Failed { .. } => "batch.failed",
            BatchEvent::TimedOut { .. } => "batch.timed_out",
            BatchEvent::Ignored { .. } => "batch.ignored",
        }
    }

    pub fn batch_id(&self) -> &BatchId {
        match self {
            BatchEvent::Started { batch_id, .. }
            | BatchEvent::Advanced { batch_id, .. }
            | BatchEvent::Completed { batch_id, .. }
            | BatchEvent::Failed { batch_id, .. }
            | BatchEvent::TimedOut { batch_id, .. }
            | BatchEvent::Ignored { batch_id, .. } => batch_id,
        }
    }
}

/// Wire shape of one broadcast message: `{actionType, payload}`.
///
/// `payload` holds the JSON-serialized [`BatchEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastAction {
    pub action_type: String,
    pub payload: String,
}

impl BroadcastAction {
    pub fn from_event(event: &BatchEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            action_type: event.action_type().to_string(),
            payload: serde_json::to_string(event)?,
        })
    }

    /// Decode the payload back into an event.
    pub fn event(&self) -> Result<BatchEvent, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_wraps_serialized_event() {
        let event = BatchEvent::Failed {
            batch_id: BatchId::from("b-1"),
            stage: Stage::WorkerRunning,
            kind: ErrorKind::Reported,
            reason: "worker crashed".into(),
        };

        let action = BroadcastAction::from_event(&event).unwrap();
        assert_eq!(action.action_type, "batch.failed");

        let payload: serde_json::Value = serde_json::from_str(&action.payload).unwrap();
        assert_eq!(payload["event"], "failed");
        assert_eq!(payload["batchId"], "b-1");
        assert_eq!(payload["stage"], "workerRunning");
        assert_eq!(payload["kind"], "reported");

        assert_eq!(action.event().unwrap(), event);
    }

    #[test]
    fn wire_shape_is_camel_case() {
        let event = BatchEvent::Completed {
            batch_id: BatchId::from("b-2"),
            output_refs: vec!["optimized.glb".into()],
        };
        let action = BroadcastAction::from_event(&event).unwrap();

        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["actionType"], "batch.completed");
        assert!(json["payload"].as_str().unwrap().contains("\"outputRefs\""));
        assert_eq!(event.batch_id().as_str(), "b-2");
    }
}
