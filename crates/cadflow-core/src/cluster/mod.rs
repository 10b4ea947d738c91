//! Cluster control-plane port and the job manager built on it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use cadflow_model::{ErrorKind, SpecError, WorkloadSpec};

mod manager;
pub use manager::{ClusterJobManager, JobManagerConfig, JobParams, RoleImages};

mod memory;
pub use memory::InMemoryCluster;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid workload spec: {0}")]
    InvalidSpec(#[from] SpecError),
    #[error("failed to encode job environment: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("pod {namespace}/{name} already exists")]
    AlreadyExists { name: String, namespace: String },
    #[error("pod {namespace}/{name} belongs to batch `{owner}`")]
    Conflict {
        name: String,
        namespace: String,
        owner: String,
    },
    #[error("pod {namespace}/{name} not found")]
    NotFound { name: String, namespace: String },
    #[error("cluster api `{op}` failed for {namespace}/{name}: {reason}")]
    Api {
        op: &'static str,
        name: String,
        namespace: String,
        reason: String,
    },
    #[error("cluster unavailable: {0}")]
    Unavailable(String),
}

impl ClusterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClusterError::InvalidSpec(_) | ClusterError::Encoding(_) => ErrorKind::Invalid,
            _ => ErrorKind::Cluster,
        }
    }

    /// Whether resubmitting the same spec could succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Cluster && !matches!(self, ClusterError::Conflict { .. })
    }
}

/// Minimal pod API the job manager needs.
///
/// Implementations report "already exists" and "not found" through the dedicated
/// [`ClusterError`] variants so the manager can treat them as idempotent outcomes.
#[async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    async fn submit_pod(&self, spec: &WorkloadSpec) -> Result<(), ClusterError>;

    async fn delete_pod(&self, name: &str, namespace: &str) -> Result<(), ClusterError>;

    /// Annotations of an existing pod, `None` when there is no such pod.
    async fn pod_annotations(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ClusterError>;
}
