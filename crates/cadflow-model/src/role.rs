use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Stage;

/// Container role executing one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobRole {
    Reader,
    Worker,
    Optimizer,
}

impl JobRole {
    pub const ALL: [JobRole; 3] = [JobRole::Reader, JobRole::Worker, JobRole::Optimizer];

    /// Short symbolic name used in job names, labels and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRole::Reader => "reader",
            JobRole::Worker => "worker",
            JobRole::Optimizer => "optimizer",
        }
    }

    /// Stage the batch sits in while a job of this role runs.
    pub fn stage(&self) -> Stage {
        match self {
            JobRole::Reader => Stage::ReaderRunning,
            JobRole::Worker => Stage::WorkerRunning,
            JobRole::Optimizer => Stage::OptimizerRunning,
        }
    }
}

impl fmt::Display for JobRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a submitted cluster job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub name: String,
    pub namespace: String,
    pub role: JobRole,
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_stage_mapping_is_inverse() {
        for role in JobRole::ALL {
            assert_eq!(role.stage().role(), Some(role));
        }
    }

    #[test]
    fn handle_display() {
        let handle = JobHandle {
            name: "cad-reader-b1".into(),
            namespace: "cad".into(),
            role: JobRole::Reader,
        };
        assert_eq!(handle.to_string(), "cad/cad-reader-b1");
    }
}
