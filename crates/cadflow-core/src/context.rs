use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    broadcast::{ActionBroadcaster, NoopBroadcaster},
    cluster::{ClusterClient, ClusterJobManager, JobManagerConfig},
    lock::{DistributedLock, LockConfig},
    metrics::{MetricsBackend, NoopMetrics},
    orchestrator::OrchestratorConfig,
    state::BatchStateStore,
    store::MemoryStore,
    sweeper::SweeperConfig,
};

/// Settings of every core component, loadable as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub lock: LockConfig,
    pub jobs: JobManagerConfig,
    pub orchestrator: OrchestratorConfig,
    pub sweeper: SweeperConfig,
}

/// Adapters shared by the core components.
///
/// Built once at startup and passed explicitly; components never reach for globals.
#[derive(Clone)]
pub struct OrchestratorContext {
    pub store: Arc<dyn MemoryStore>,
    pub cluster: Arc<dyn ClusterClient>,
    pub broadcaster: Arc<dyn ActionBroadcaster>,
    pub metrics: Arc<dyn MetricsBackend>,
}

impl OrchestratorContext {
    pub fn new(store: Arc<dyn MemoryStore>, cluster: Arc<dyn ClusterClient>) -> Self {
        Self {
            store,
            cluster,
            broadcaster: Arc::new(NoopBroadcaster),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn ActionBroadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsBackend>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn lock(&self, config: LockConfig) -> DistributedLock {
        DistributedLock::new(Arc::clone(&self.store), config).with_metrics(Arc::clone(&self.metrics))
    }

    pub fn state_store(&self, config: &CoreConfig) -> BatchStateStore {
        BatchStateStore::new(
            Arc::clone(&self.store),
            self.lock(config.lock),
            config.orchestrator.state_config(),
        )
        .with_metrics(Arc::clone(&self.metrics))
    }

    pub fn job_manager(&self, config: JobManagerConfig) -> ClusterJobManager {
        ClusterJobManager::new(Arc::clone(&self.cluster), config).with_metrics(Arc::clone(&self.metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: CoreConfig = serde_json::from_str(
            r#"{
                "lock": {"max_attempts": 5},
                "jobs": {"namespace": "cad", "images": {"reader": "registry/reader:1.2"}},
                "sweeper": {"interval_ms": 250}
            }"#,
        )
        .unwrap();

        assert_eq!(cfg.lock.max_attempts, 5);
        assert_eq!(cfg.lock.ttl_ms, 30_000);
        assert_eq!(cfg.jobs.namespace, "cad");
        assert_eq!(cfg.jobs.images.reader, "registry/reader:1.2");
        assert_eq!(cfg.jobs.images.worker, "cadflow/worker:latest");
        assert_eq!(cfg.orchestrator.submit_attempts, 3);
        assert_eq!(cfg.sweeper.interval_ms, 250);
    }
}
