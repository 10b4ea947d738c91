//! Lifecycle actions rendered as log lines.

mod view;
pub use view::{log_event, message_for};

use async_trait::async_trait;
use tracing::warn;

use cadflow_core::{ActionBroadcaster, BroadcastError};
use cadflow_model::BroadcastAction;

/// Logs every broadcast action at a level matching its severity.
///
/// Never fails: an undecodable payload is logged and dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBroadcaster;

#[async_trait]
impl ActionBroadcaster for LogBroadcaster {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn broadcast(&self, action: &BroadcastAction) -> Result<(), BroadcastError> {
        match action.event() {
            Ok(event) => log_event(&event),
            Err(e) => warn!(action = %action.action_type, error = %e, "undecodable action payload"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cadflow_model::{BatchEvent, BatchId, Stage};

    use super::*;

    #[tokio::test]
    async fn accepts_valid_and_garbled_payloads() {
        let action = BroadcastAction::from_event(&BatchEvent::Ignored {
            batch_id: BatchId::from("b-1"),
            reported: Stage::ReaderRunning,
            current: Stage::WorkerRunning,
        })
        .unwrap();
        LogBroadcaster.broadcast(&action).await.unwrap();

        let garbled = BroadcastAction {
            action_type: "batch.started".into(),
            payload: "{not json".into(),
        };
        LogBroadcaster.broadcast(&garbled).await.unwrap();
        assert_eq!(LogBroadcaster.name(), "log");
    }
}
