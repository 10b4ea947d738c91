use std::fmt;

use serde::{Deserialize, Serialize};

use crate::JobRole;

/// Position of a batch in the processing pipeline.
///
/// The happy path is `Created -> ReaderRunning -> WorkerRunning -> OptimizerRunning -> Completed`.
/// `Failed` and `TimedOut` are reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    /// Record written, no job submitted yet.
    Created,
    /// Reader job parses the raw CAD file.
    ReaderRunning,
    /// Worker job converts the parsed geometry.
    WorkerRunning,
    /// Optimizer job produces the final artifacts.
    OptimizerRunning,
    /// Every stage reported completion.
    Completed,
    /// Explicit failure signal or unrecoverable submission error.
    Failed,
    /// Liveness deadline elapsed without a completion signal.
    TimedOut,
}

impl Stage {
    /// Returns `true` if the batch will not transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed | Stage::TimedOut)
    }

    /// Returns `true` if a cluster job is expected to be running for this stage.
    pub fn is_running(&self) -> bool {
        self.role().is_some()
    }

    /// Role whose job executes while the batch sits in this stage.
    pub fn role(&self) -> Option<JobRole> {
        match self {
            Stage::ReaderRunning => Some(JobRole::Reader),
            Stage::WorkerRunning => Some(JobRole::Worker),
            Stage::OptimizerRunning => Some(JobRole::Optimizer),
            _ => None,
        }
    }

    /// Next stage on the happy path, `None` for terminal stages.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Created => Some(Stage::ReaderRunning),
            Stage::ReaderRunning => Some(Stage::WorkerRunning),
            Stage::WorkerRunning => Some(Stage::OptimizerRunning),
            Stage::OptimizerRunning => Some(Stage::Completed),
            Stage::Completed | Stage::Failed | Stage::TimedOut => None,
        }
    }

    /// Ordinal along the happy path. Failure stages share the top rank.
    fn rank(&self) -> u8 {
        match self {
            Stage::Created => 0,
            Stage::ReaderRunning => 1,
            Stage::WorkerRunning => 2,
            Stage::OptimizerRunning => 3,
            Stage::Completed | Stage::Failed | Stage::TimedOut => 4,
        }
    }

    /// Whether `self -> to` respects stage monotonicity.
    pub fn can_transition_to(&self, to: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            Stage::Failed | Stage::TimedOut => true,
            _ => to.rank() > self.rank(),
        }
    }

    /// Whether `self` is already at or beyond `target` on the happy path.
    pub fn has_reached(&self, target: Stage) -> bool {
        self.rank() >= target.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Created => "created",
            Stage::ReaderRunning => "readerRunning",
            Stage::WorkerRunning => "workerRunning",
            Stage::OptimizerRunning => "optimizerRunning",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
            Stage::TimedOut => "timedOut",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
