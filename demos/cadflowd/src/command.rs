//! Line-delimited JSON commands read from stdin, standing in for the job notification queue.

use serde::Deserialize;

use cadflow_core::{BatchOrchestrator, OrchestratorError, Outcome};
use cadflow_model::{BatchId, FileRef, StageCompletion};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Start {
        batch_id: BatchId,
        source_file_ref: FileRef,
    },
    Complete(StageCompletion),
    Fail {
        batch_id: BatchId,
        reason: String,
    },
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    pub async fn apply(self, orch: &BatchOrchestrator) -> Result<Outcome, OrchestratorError> {
        match self {
            Command::Start {
                batch_id,
                source_file_ref,
            } => orch.start(&batch_id, &source_file_ref).await,
            Command::Complete(signal) => orch.handle_completion(signal).await,
            Command::Fail { batch_id, reason } => orch.fail(&batch_id, &reason).await,
        }
    }
}
