//! Outbound lifecycle notifications.
//!
//! The orchestrator publishes one [`BroadcastAction`] per lifecycle event.
//! Delivery failures are logged by the caller and never roll back state.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use cadflow_model::BroadcastAction;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcaster `{name}` failed: {reason}")]
    Failed { name: &'static str, reason: String },
}

#[async_trait]
pub trait ActionBroadcaster: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn broadcast(&self, action: &BroadcastAction) -> Result<(), BroadcastError>;
}

/// Discards every action.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

#[async_trait]
impl ActionBroadcaster for NoopBroadcaster {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn broadcast(&self, _action: &BroadcastAction) -> Result<(), BroadcastError> {
        Ok(())
    }
}

/// In-process pub/sub over a tokio broadcast channel.
///
/// Publishing with no subscribers succeeds; slow subscribers observe `Lagged`.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<BroadcastAction>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastAction> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl ActionBroadcaster for ChannelBroadcaster {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn broadcast(&self, action: &BroadcastAction) -> Result<(), BroadcastError> {
        match self.tx.send(action.clone()) {
            Ok(receivers) => trace!(action = %action.action_type, receivers, "action published"),
            Err(_) => trace!(action = %action.action_type, "no subscribers"),
        }
        Ok(())
    }
}

/// Forwards each action to every target, in registration order.
///
/// A failing target does not stop delivery to the others; the first failure is returned.
#[derive(Clone, Default)]
pub struct FanoutBroadcaster {
    targets: Vec<Arc<dyn ActionBroadcaster>>,
}

impl FanoutBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: Arc<dyn ActionBroadcaster>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[async_trait]
impl ActionBroadcaster for FanoutBroadcaster {
    fn name(&self) -> &'static str {
        "fanout"
    }

    async fn broadcast(&self, action: &BroadcastAction) -> Result<(), BroadcastError> {
        let mut first_err = None;
        for target in &self.targets {
            if let Err(e) = target.broadcast(action).await {
                warn!(target = target.name(), action = %action.action_type, error = %e, "broadcast target failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use cadflow_model::{BatchEvent, BatchId, Stage};

    use super::*;

    fn action() -> BroadcastAction {
        BroadcastAction::from_event(&BatchEvent::Ignored {
            batch_id: BatchId::from("b-1"),
            reported: Stage::ReaderRunning,
            current: Stage::WorkerRunning,
        })
        .unwrap()
    }

    struct Failing;

    #[async_trait]
    impl ActionBroadcaster for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn broadcast(&self, _action: &BroadcastAction) -> Result<(), BroadcastError> {
            Err(BroadcastError::Failed {
                name: "failing",
                reason: "down".into(),
            })
        }
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl ActionBroadcaster for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn broadcast(&self, _action: &BroadcastAction) -> Result<(), BroadcastError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn channel_delivers_to_subscribers() {
        let channel = ChannelBroadcaster::new(8);
        let mut rx = channel.subscribe();

        channel.broadcast(&action()).await.unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.action_type, "batch.ignored");
    }

    #[tokio::test]
    async fn channel_without_subscribers_is_ok() {
        let channel = ChannelBroadcaster::new(8);
        channel.broadcast(&action()).await.unwrap();
    }

    #[tokio::test]
    async fn fanout_reaches_all_targets_despite_failure() {
        let counting = Arc::new(Counting::default());
        let fanout = FanoutBroadcaster::new()
            .with(Arc::new(Failing))
            .with(counting.clone());

        let err = fanout.broadcast(&action()).await.unwrap_err();
        assert!(matches!(err, BroadcastError::Failed { name: "failing", .. }));
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
        assert_eq!(fanout.len(), 2);
    }
}
