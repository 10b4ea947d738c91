use thiserror::Error;

use cadflow_model::{BatchId, ErrorKind};

use crate::state::StateError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error("no record for batch {0}")]
    UnknownBatch(BatchId),
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::State(e) => e.kind(),
            OrchestratorError::UnknownBatch(_) => ErrorKind::Protocol,
        }
    }
}
