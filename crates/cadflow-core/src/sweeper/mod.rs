//! Periodic reclamation of batches whose jobs stopped reporting.
//!
//! Each pass lists expired records and hands every candidate to
//! [`BatchOrchestrator::time_out`], which re-checks the deadline under the batch lock.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};
use taskvisor::{BackoffPolicy, RestartPolicy, TaskError, TaskFn, TaskRef, TaskSpec};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadflow_model::DurationMs;

use crate::{
    metrics::MetricsBackend,
    orchestrator::{BatchOrchestrator, Outcome},
};

const TASK_NAME: &str = "cadflow-timeout-sweeper";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_ms: DurationMs,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_ms: 5_000 }
    }
}

impl SweeperConfig {
    #[inline]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired candidates examined.
    pub scanned: usize,
    pub timed_out: usize,
    /// Candidates that completed or advanced before the lock was taken.
    pub skipped: usize,
    pub errors: usize,
}

impl SweepReport {
    pub fn summary(&self) -> String {
        format!(
            "scanned={} timed_out={} skipped={} errors={}",
            self.scanned, self.timed_out, self.skipped, self.errors
        )
    }

    pub fn is_idle(&self) -> bool {
        self.scanned == 0 && self.errors == 0
    }
}

pub struct TimeoutSweeper {
    orchestrator: Arc<BatchOrchestrator>,
    metrics: Arc<dyn MetricsBackend>,
    config: SweeperConfig,
}

impl TimeoutSweeper {
    pub fn new(
        orchestrator: Arc<BatchOrchestrator>,
        metrics: Arc<dyn MetricsBackend>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            orchestrator,
            metrics,
            config,
        }
    }

    /// One pass against the clock value `now`.
    pub async fn sweep_once(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();

        let expired = match self.orchestrator.state().list_expired(now).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, kind = %e.kind(), "failed to list expired batches");
                report.errors += 1;
                return report;
            }
        };
        report.scanned = expired.len();

        for batch_id in expired {
            match self.orchestrator.time_out(&batch_id, now).await {
                Ok(Outcome::Applied(_)) => report.timed_out += 1,
                Ok(Outcome::Ignored(stage)) => {
                    debug!(batch_id = %batch_id, %stage, "batch recovered before timeout");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(batch_id = %batch_id, error = %e, kind = %e.kind(), "failed to time out batch");
                    report.errors += 1;
                }
            }
        }

        self.metrics.sweep_completed(report.timed_out);
        report
    }

    /// Sweep every `interval_ms` until `cancel` fires. The first pass runs immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.config.interval_ms, "timeout sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sweep_once(SystemTime::now()).await;
                    if report.timed_out > 0 || report.errors > 0 {
                        info!(summary = %report.summary(), "sweep finished");
                    } else if !report.is_idle() {
                        debug!(summary = %report.summary(), "sweep finished");
                    }
                }
            }
        }
        info!("timeout sweeper stopped");
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Single sweep pass as a supervised task, for hosts that schedule it periodically themselves.
    pub fn task(self: Arc<Self>) -> TaskRef {
        TaskFn::arc(TASK_NAME, move |ctx: CancellationToken| {
            let sweeper = Arc::clone(&self);

            async move {
                if ctx.is_cancelled() {
                    return Err(TaskError::Canceled);
                }
                let report = sweeper.sweep_once(SystemTime::now()).await;
                if report.errors > 0 {
                    return Err(TaskError::Fail {
                        reason: format!("sweep incomplete: {}", report.summary()),
                    });
                }
                Ok(())
            }
        })
    }

    /// [`Self::task`] scheduled every `interval_ms`; a failed pass is retried with backoff
    /// capped at four intervals.
    pub fn task_spec(self: Arc<Self>) -> TaskSpec {
        let interval = self.config.interval();
        let backoff = BackoffPolicy {
            first: interval,
            max: interval.saturating_mul(4),
            factor: 2.0,
            ..BackoffPolicy::default()
        };
        TaskSpec::new(
            self.task(),
            RestartPolicy::Always {
                interval: Some(interval),
            },
            backoff,
            Some(interval.max(Duration::from_secs(1)).saturating_mul(6)),
        )
    }
}
