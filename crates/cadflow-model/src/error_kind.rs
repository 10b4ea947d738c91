use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification attached to every failure the orchestration core reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Lock busy or lost to another holder.
    Contention,
    /// Shared memory store read/write failed.
    Store,
    /// Cluster control plane rejected or failed a job submission/deletion.
    Cluster,
    /// Notification or request that does not fit the batch's current state.
    Protocol,
    /// Liveness deadline elapsed.
    Timeout,
    /// Malformed input, e.g. a workload spec that fails validation.
    Invalid,
    /// Failure signalled from outside (a job or an operator).
    Reported,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Contention => "contention",
            ErrorKind::Store => "store",
            ErrorKind::Cluster => "cluster",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Reported => "reported",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
