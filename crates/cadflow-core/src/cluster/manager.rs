use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cadflow_model::{
    BatchId, EnvVars, FileRef, JobHandle, JobRole, WorkloadSpec,
    workload::{ContainerDef, PullPolicy, RestartPolicy, Toleration},
};

use super::{ClusterClient, ClusterError};
use crate::metrics::{MetricsBackend, NoopMetrics};

pub const APP_LABEL: &str = "app";
pub const APP_NAME: &str = "cadflow";
pub const ROLE_LABEL: &str = "cadflow.io/role";
pub const BATCH_LABEL: &str = "cadflow.io/batch";

const BATCH_ID_ANNOTATION: &str = "cadflow.io/batch-id";
const SOURCE_ANNOTATION: &str = "cadflow.io/source";

pub const ENV_BATCH_ID: &str = "CADFLOW_BATCH_ID";
pub const ENV_STAGE: &str = "CADFLOW_STAGE";
pub const ENV_SOURCE_FILE: &str = "CADFLOW_SOURCE_FILE";
pub const ENV_INPUT_REFS: &str = "CADFLOW_INPUT_REFS";

/// Kubernetes object names and label values are capped at 63 characters.
const MAX_NAME_LEN: usize = 63;

/// Container image per job role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleImages {
    pub reader: String,
    pub worker: String,
    pub optimizer: String,
}

impl Default for RoleImages {
    fn default() -> Self {
        Self {
            reader: "cadflow/reader:latest".into(),
            worker: "cadflow/worker:latest".into(),
            optimizer: "cadflow/optimizer:latest".into(),
        }
    }
}

impl RoleImages {
    pub fn get(&self, role: JobRole) -> &str {
        match role {
            JobRole::Reader => &self.reader,
            JobRole::Worker => &self.worker,
            JobRole::Optimizer => &self.optimizer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobManagerConfig {
    pub namespace: String,
    pub images: RoleImages,
    pub pull_policy: PullPolicy,
    /// Variables copied from this process's environment into optimizer pods.
    pub passthrough_env: Vec<String>,
    pub node_selector: BTreeMap<String, String>,
    pub tolerations: Vec<Toleration>,
    /// Topology domain used for worker/optimizer anti-affinity.
    pub hostname_topology_key: String,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            namespace: "cadflow".into(),
            images: RoleImages::default(),
            pull_policy: PullPolicy::IfNotPresent,
            passthrough_env: Vec::new(),
            node_selector: BTreeMap::new(),
            tolerations: Vec::new(),
            hostname_topology_key: "kubernetes.io/hostname".into(),
        }
    }
}

/// Per-submission inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParams {
    pub batch_id: BatchId,
    pub source_file_ref: FileRef,
    /// Outputs of the previous stage, empty for the reader.
    pub input_refs: Vec<FileRef>,
}

/// Builds and submits role jobs through a [`ClusterClient`].
#[derive(Clone)]
pub struct ClusterJobManager {
    client: Arc<dyn ClusterClient>,
    config: JobManagerConfig,
    passthrough: EnvVars,
    metrics: Arc<dyn MetricsBackend>,
}

impl ClusterJobManager {
    /// Pass-through values are captured from the process environment once, here.
    pub fn new(client: Arc<dyn ClusterClient>, config: JobManagerConfig) -> Self {
        let passthrough = config
            .passthrough_env
            .iter()
            .filter_map(|name| match std::env::var(name) {
                Ok(value) => Some((name.clone(), value)),
                Err(_) => {
                    warn!(var = %name, "pass-through variable not set, skipping");
                    None
                }
            })
            .collect();

        Self {
            client,
            config,
            passthrough,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Replace the captured pass-through values.
    pub fn with_passthrough_values(mut self, values: EnvVars) -> Self {
        self.passthrough = values;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsBackend>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &JobManagerConfig {
        &self.config
    }

    /// `cad-<role>-<batch fragment>`.
    ///
    /// The fragment gains a hash of the raw id when sanitizing changed it or when the name
    /// would exceed 63 characters, so ids differing only in case or punctuation stay apart.
    pub fn job_name(role: JobRole, batch_id: &BatchId) -> String {
        let prefix = format!("cad-{}-", role.as_str());
        let budget = MAX_NAME_LEN - prefix.len();
        format!("{prefix}{}", bounded_fragment(batch_id, budget))
    }

    /// Handle of the pod `role` runs in for `batch_id`, whether or not it was submitted.
    pub fn handle(&self, role: JobRole, batch_id: &BatchId) -> JobHandle {
        JobHandle {
            name: Self::job_name(role, batch_id),
            namespace: self.config.namespace.clone(),
            role,
        }
    }

    /// Assemble the pod for `role` without submitting it.
    pub fn build_spec(&self, role: JobRole, params: &JobParams) -> Result<WorkloadSpec, ClusterError> {
        let batch = params.batch_id.as_str();

        let mut env = EnvVars::new();
        env.push(ENV_BATCH_ID, batch);
        env.push(ENV_STAGE, role.stage().as_str());
        env.push(ENV_SOURCE_FILE, params.source_file_ref.as_str());
        env.push(ENV_INPUT_REFS, serde_json::to_string(&params.input_refs)?);
        if role == JobRole::Optimizer {
            env = env.merged(&self.passthrough);
        }

        let mut args = vec!["--batch-id".to_string(), batch.to_string()];
        match role {
            JobRole::Reader => {
                args.push("--source".into());
                args.push(params.source_file_ref.clone());
            }
            JobRole::Worker | JobRole::Optimizer => {
                for input in &params.input_refs {
                    args.push("--input".into());
                    args.push(input.clone());
                }
            }
        }

        let container = ContainerDef::new(role.as_str(), self.config.images.get(role))
            .pull_policy(self.config.pull_policy)
            .envs(&env)
            .command(format!("cadflow-{}", role.as_str()), args);

        let peers = [(APP_LABEL, APP_NAME), (ROLE_LABEL, role.as_str())];
        let topology = self.config.hostname_topology_key.as_str();

        let mut builder = WorkloadSpec::builder()
            .name(Self::job_name(role, &params.batch_id))
            .namespace(self.config.namespace.as_str())
            .label(APP_LABEL, APP_NAME)
            .label(ROLE_LABEL, role.as_str())
            .label(BATCH_LABEL, bounded_fragment(&params.batch_id, MAX_NAME_LEN))
            .annotation(BATCH_ID_ANNOTATION, batch)
            .annotation(SOURCE_ANNOTATION, params.source_file_ref.as_str())
            .restart_policy(RestartPolicy::Never)
            .tolerations(self.config.tolerations.iter().cloned());
        for (key, value) in &self.config.node_selector {
            builder = builder.node_selector(key.as_str(), value.as_str());
        }
        builder = match role {
            JobRole::Reader => builder,
            JobRole::Worker => builder.anti_affinity_rule(peers, topology),
            JobRole::Optimizer => builder.anti_affinity_preference(peers, topology),
        };

        Ok(builder.container(container).build()?)
    }

    /// Build and submit the job. A pod that already exists counts as submitted.
    pub async fn submit_job(&self, role: JobRole, params: &JobParams) -> Result<JobHandle, ClusterError> {
        let spec = self.build_spec(role, params)?;
        let handle = JobHandle {
            name: spec.name().to_string(),
            namespace: spec.namespace().to_string(),
            role,
        };

        match self.client.submit_pod(&spec).await {
            Ok(()) => {
                info!(batch_id = %params.batch_id, %role, job = %handle, "job submitted");
            }
            Err(ClusterError::AlreadyExists { .. }) => {
                if let Err(e) = self.verify_owner(&handle, &params.batch_id).await {
                    self.metrics.job_submitted(role, false);
                    return Err(e);
                }
                debug!(batch_id = %params.batch_id, %role, job = %handle, "job already exists");
            }
            Err(e) => {
                self.metrics.job_submitted(role, false);
                return Err(e);
            }
        }
        self.metrics.job_submitted(role, true);
        Ok(handle)
    }

    /// An existing pod is adopted only if it was submitted for `batch_id`.
    async fn verify_owner(&self, handle: &JobHandle, batch_id: &BatchId) -> Result<(), ClusterError> {
        let annotations = self
            .client
            .pod_annotations(&handle.name, &handle.namespace)
            .await?;
        let owner = annotations
            .as_ref()
            .and_then(|a| a.get(BATCH_ID_ANNOTATION))
            .map(String::as_str);

        match owner {
            Some(owner) if owner == batch_id.as_str() => Ok(()),
            // Deleted between the conflict and the lookup.
            None if annotations.is_none() => Err(ClusterError::Unavailable(format!(
                "pod {handle} vanished after a create conflict"
            ))),
            other => {
                warn!(batch_id = %batch_id, job = %handle, owner = ?other, "job name taken by another batch");
                Err(ClusterError::Conflict {
                    name: handle.name.clone(),
                    namespace: handle.namespace.clone(),
                    owner: other.unwrap_or_default().to_string(),
                })
            }
        }
    }

    /// Delete a job. A pod that is already gone counts as deleted.
    pub async fn delete_job(&self, handle: &JobHandle) -> Result<(), ClusterError> {
        match self.client.delete_pod(&handle.name, &handle.namespace).await {
            Ok(()) => {
                debug!(job = %handle, "job deleted");
                Ok(())
            }
            Err(ClusterError::NotFound { .. }) => {
                debug!(job = %handle, "job already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// DNS fragment of `id` no longer than `budget`, unique per raw id.
///
/// A fragment that differs from the id, or does not fit, keeps a prefix and gains an
/// 8-hex-digit FNV-1a hash of the raw id.
fn bounded_fragment(id: &BatchId, budget: usize) -> String {
    let fragment = id.dns_fragment();
    if fragment == id.as_str() && fragment.len() <= budget {
        return fragment;
    }

    let hash = id
        .as_str()
        .bytes()
        .fold(0x811c_9dc5_u32, |h, b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193));
    let keep = budget.saturating_sub(9).min(fragment.len());
    let head = fragment[..keep].trim_end_matches('-');
    format!("{head}-{hash:08x}")
}
