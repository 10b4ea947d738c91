//! Orchestration core for multi-stage CAD processing batches.
//!
//! - [`DistributedLock`]: mutual exclusion on a shared [`MemoryStore`] with expiring keys.
//! - [`ClusterJobManager`]: turns a [`JobRole`](cadflow_model::JobRole) into a pod and submits it through a [`ClusterClient`].
//! - [`BatchStateStore`]: per-batch records guarded by the batch lock.
//! - [`BatchOrchestrator`]: the `Created -> Reader -> Worker -> Optimizer -> Completed` state machine.
//! - [`TimeoutSweeper`]: periodic reclamation of batches whose liveness deadline elapsed.
//!
//! Components are wired explicitly through an [`OrchestratorContext`].

pub mod error;
pub use error::OrchestratorError;

pub mod store;
pub use store::{InMemoryStore, MemoryStore, StoreError, StoreKey};

pub mod lock;
pub use lock::{DistributedLock, LockAcquisition, LockConfig, LockError, LockToken};

pub mod cluster;
pub use cluster::{
    ClusterClient, ClusterError, ClusterJobManager, InMemoryCluster, JobManagerConfig, JobParams,
    RoleImages,
};

pub mod state;
pub use state::{BatchSession, BatchStateStore, StateConfig, StateError, Transition};

pub mod broadcast;
pub use broadcast::{
    ActionBroadcaster, BroadcastError, ChannelBroadcaster, FanoutBroadcaster, NoopBroadcaster,
};

mod metrics;
pub use metrics::{MetricsBackend, NoopMetrics};

pub mod orchestrator;
pub use orchestrator::{BatchOrchestrator, OrchestratorConfig, Outcome};

pub mod sweeper;
pub use sweeper::{SweepReport, SweeperConfig, TimeoutSweeper};

mod context;
pub use context::{CoreConfig, OrchestratorContext};

mod system;
pub use system::holder_prefix;

pub use cadflow_model::ErrorKind;
