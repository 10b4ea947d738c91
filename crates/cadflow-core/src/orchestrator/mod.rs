//! Batch state machine: `Created -> ReaderRunning -> WorkerRunning -> OptimizerRunning -> Completed`.
//!
//! Every entry point runs under the batch lock, so notifications for one batch are applied one at a time.
//! Duplicate or out-of-order notifications resolve to [`Outcome::Ignored`] rather than errors.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use cadflow_model::{
    BatchEvent, BatchId, BatchRecord, BroadcastAction, DurationMs, ErrorKind, FileRef, JobHandle,
    JobRole, Stage, StageCompletion,
};

use crate::{
    broadcast::ActionBroadcaster,
    cluster::{ClusterJobManager, JobParams},
    context::{CoreConfig, OrchestratorContext},
    error::OrchestratorError,
    metrics::MetricsBackend,
    state::{BatchSession, BatchStateStore, StateConfig},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Liveness window granted to each running stage.
    pub stage_timeout_ms: DurationMs,
    /// Submissions tried per job before the batch fails.
    pub submit_attempts: u32,
    pub terminal_retention_ms: DurationMs,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stage_timeout_ms: 600_000,
            submit_attempts: 3,
            terminal_retention_ms: 86_400_000,
        }
    }
}

impl OrchestratorConfig {
    #[inline]
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    pub fn state_config(&self) -> StateConfig {
        StateConfig {
            liveness_ms: self.stage_timeout_ms,
            terminal_retention_ms: self.terminal_retention_ms,
        }
    }
}

/// What an entry point did with the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The batch moved to this stage.
    Applied(Stage),
    /// Nothing changed; the batch remains in this stage.
    Ignored(Stage),
}

impl Outcome {
    pub fn stage(&self) -> Stage {
        match self {
            Outcome::Applied(stage) | Outcome::Ignored(stage) => *stage,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

pub struct BatchOrchestrator {
    state: BatchStateStore,
    jobs: ClusterJobManager,
    broadcaster: Arc<dyn ActionBroadcaster>,
    metrics: Arc<dyn MetricsBackend>,
    config: OrchestratorConfig,
}

impl BatchOrchestrator {
    pub fn new(
        state: BatchStateStore,
        jobs: ClusterJobManager,
        broadcaster: Arc<dyn ActionBroadcaster>,
        metrics: Arc<dyn MetricsBackend>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            state,
            jobs,
            broadcaster,
            metrics,
            config,
        }
    }

    pub fn from_context(ctx: &OrchestratorContext, config: &CoreConfig) -> Self {
        Self::new(
            ctx.state_store(config),
            ctx.job_manager(config.jobs.clone()),
            Arc::clone(&ctx.broadcaster),
            Arc::clone(&ctx.metrics),
            config.orchestrator,
        )
    }

    pub fn state(&self) -> &BatchStateStore {
        &self.state
    }

    pub fn jobs(&self) -> &ClusterJobManager {
        &self.jobs
    }

    /// Create the batch and launch its reader. A batch that already exists is left untouched.
    #[instrument(level = "info", skip_all, fields(batch_id = %batch_id))]
    pub async fn start(
        &self,
        batch_id: &BatchId,
        source_file_ref: impl Into<FileRef>,
    ) -> Result<Outcome, OrchestratorError> {
        let source_file_ref = source_file_ref.into();
        let session = self.state.open(batch_id).await?;
        let result = self.start_locked(&session, source_file_ref).await;
        session.finish(result).await
    }

    async fn start_locked(
        &self,
        session: &BatchSession<'_>,
        source_file_ref: FileRef,
    ) -> Result<Outcome, OrchestratorError> {
        let batch_id = session.batch_id().clone();

        if let Some(existing) = session.load().await? {
            debug!(current = %existing.stage, "duplicate start ignored");
            self.emit(BatchEvent::Ignored {
                batch_id,
                reported: Stage::Created,
                current: existing.stage,
            })
            .await;
            return Ok(Outcome::Ignored(existing.stage));
        }

        let mut record = BatchRecord::new(
            batch_id.clone(),
            source_file_ref.clone(),
            SystemTime::now(),
            self.config.stage_timeout(),
        );
        session.create(&record).await?;

        let params = JobParams {
            batch_id: batch_id.clone(),
            source_file_ref: source_file_ref.clone(),
            input_refs: Vec::new(),
        };
        let Some(job) = self.launch(session, &mut record, JobRole::Reader, params).await? else {
            return Ok(Outcome::Applied(Stage::Failed));
        };

        self.enter(session, &mut record, Stage::ReaderRunning, Some(job.clone())).await?;
        info!(job = %job, "batch started");
        self.emit(BatchEvent::Started {
            batch_id,
            source_file_ref,
            job,
        })
        .await;
        Ok(Outcome::Applied(Stage::ReaderRunning))
    }

    /// Apply a completion signal: `stage` is the stage that just finished.
    ///
    /// Signals that do not match the current stage are ignored and broadcast as `batch.ignored`.
    #[instrument(level = "info", skip_all, fields(batch_id = %batch_id, stage = %stage))]
    pub async fn on_stage_complete(
        &self,
        batch_id: &BatchId,
        stage: Stage,
        output_refs: Vec<FileRef>,
    ) -> Result<Outcome, OrchestratorError> {
        let session = self.state.open(batch_id).await?;
        let result = self.complete_locked(&session, stage, output_refs).await;
        session.finish(result).await
    }

    /// [`BatchOrchestrator::on_stage_complete`] for a decoded completion message.
    pub async fn handle_completion(&self, signal: StageCompletion) -> Result<Outcome, OrchestratorError> {
        self.on_stage_complete(&signal.batch_id, signal.stage, signal.output_refs)
            .await
    }

    async fn complete_locked(
        &self,
        session: &BatchSession<'_>,
        stage: Stage,
        output_refs: Vec<FileRef>,
    ) -> Result<Outcome, OrchestratorError> {
        let batch_id = session.batch_id().clone();
        let Some(mut record) = session.load().await? else {
            return Err(OrchestratorError::UnknownBatch(batch_id));
        };

        let current = record.stage;
        let next = match stage.next() {
            Some(next) if stage == current && stage.is_running() => next,
            _ => {
                debug!(current = %current, "stale completion ignored");
                self.emit(BatchEvent::Ignored {
                    batch_id,
                    reported: stage,
                    current,
                })
                .await;
                return Ok(Outcome::Ignored(current));
            }
        };

        record.output_refs = output_refs.clone();
        record.active_job = None;

        let Some(role) = next.role() else {
            self.enter(session, &mut record, Stage::Completed, None).await?;
            info!("batch completed");
            self.emit(BatchEvent::Completed {
                batch_id,
                output_refs,
            })
            .await;
            return Ok(Outcome::Applied(Stage::Completed));
        };

        let params = JobParams {
            batch_id: batch_id.clone(),
            source_file_ref: record.source_file_ref.clone(),
            input_refs: output_refs.clone(),
        };
        let Some(job) = self.launch(session, &mut record, role, params).await? else {
            return Ok(Outcome::Applied(Stage::Failed));
        };

        self.enter(session, &mut record, next, Some(job.clone())).await?;
        info!(from = %stage, to = %next, job = %job, "batch advanced");
        self.emit(BatchEvent::Advanced {
            batch_id,
            from: stage,
            to: next,
            output_refs,
            job,
        })
        .await;
        Ok(Outcome::Applied(next))
    }

    /// Fail the batch on an external signal and delete its running job.
    #[instrument(level = "info", skip_all, fields(batch_id = %batch_id))]
    pub async fn fail(&self, batch_id: &BatchId, reason: &str) -> Result<Outcome, OrchestratorError> {
        let session = self.state.open(batch_id).await?;
        let result = self.fail_locked(&session, reason).await;
        session.finish(result).await
    }

    async fn fail_locked(&self, session: &BatchSession<'_>, reason: &str) -> Result<Outcome, OrchestratorError> {
        let Some(mut record) = session.load().await? else {
            return Err(OrchestratorError::UnknownBatch(session.batch_id().clone()));
        };
        if record.stage.is_terminal() {
            debug!(current = %record.stage, "failure signal for finished batch ignored");
            self.emit(BatchEvent::Ignored {
                batch_id: record.batch_id.clone(),
                reported: Stage::Failed,
                current: record.stage,
            })
            .await;
            return Ok(Outcome::Ignored(record.stage));
        }

        self.terminate(session, &mut record, Stage::Failed, ErrorKind::Reported, reason)
            .await?;
        Ok(Outcome::Applied(Stage::Failed))
    }

    /// Time the batch out if its deadline is still elapsed at `now`.
    ///
    /// The check is repeated under the lock, so a completion that raced the sweeper wins.
    #[instrument(level = "debug", skip_all, fields(batch_id = %batch_id))]
    pub async fn time_out(&self, batch_id: &BatchId, now: SystemTime) -> Result<Outcome, OrchestratorError> {
        let session = self.state.open(batch_id).await?;
        let result = self.time_out_locked(&session, now).await;
        session.finish(result).await
    }

    async fn time_out_locked(
        &self,
        session: &BatchSession<'_>,
        now: SystemTime,
    ) -> Result<Outcome, OrchestratorError> {
        let Some(mut record) = session.load().await? else {
            return Err(OrchestratorError::UnknownBatch(session.batch_id().clone()));
        };
        if !record.is_expired(now) {
            debug!(current = %record.stage, "batch no longer expired");
            self.emit(BatchEvent::Ignored {
                batch_id: record.batch_id.clone(),
                reported: Stage::TimedOut,
                current: record.stage,
            })
            .await;
            return Ok(Outcome::Ignored(record.stage));
        }

        self.terminate(
            session,
            &mut record,
            Stage::TimedOut,
            ErrorKind::Timeout,
            "liveness deadline elapsed",
        )
        .await?;
        Ok(Outcome::Applied(Stage::TimedOut))
    }

    /// Submit the job for `role`, retrying transient cluster failures.
    ///
    /// Returns `None` once the batch has been failed because submission was exhausted or the spec was invalid.
    async fn launch(
        &self,
        session: &BatchSession<'_>,
        record: &mut BatchRecord,
        role: JobRole,
        params: JobParams,
    ) -> Result<Option<JobHandle>, OrchestratorError> {
        let attempts = self.config.submit_attempts.max(1);
        let mut attempt = 0;

        let err = loop {
            attempt += 1;
            match self.jobs.submit_job(role, &params).await {
                Ok(job) => return Ok(Some(job)),
                Err(e) => {
                    record.retry_count += 1;
                    if !e.is_retryable() || attempt >= attempts {
                        break e;
                    }
                    warn!(%role, attempt, attempts, error = %e, "job submission failed, retrying");
                }
            }
        };

        let reason = format!("{role} job submission failed after {attempt} attempt(s): {err}");
        warn!(%role, error = %err, "giving up on job submission");
        self.terminate(session, record, Stage::Failed, err.kind(), &reason)
            .await?;
        Ok(None)
    }

    /// Persist `record` in `stage` with a fresh deadline.
    async fn enter(
        &self,
        session: &BatchSession<'_>,
        record: &mut BatchRecord,
        stage: Stage,
        job: Option<JobHandle>,
    ) -> Result<(), OrchestratorError> {
        record.stage = stage;
        record.active_job = job;
        record.touch(SystemTime::now(), self.config.stage_timeout());
        session.save(record).await?;
        self.metrics.stage_entered(stage);
        Ok(())
    }

    /// Move to `Failed` or `TimedOut`, broadcast, then delete the batch's jobs best-effort.
    ///
    /// Besides the recorded job, the pods of the current and every later role are deleted by
    /// name, which reclaims a pod submitted just before a save that failed.
    async fn terminate(
        &self,
        session: &BatchSession<'_>,
        record: &mut BatchRecord,
        stage: Stage,
        kind: ErrorKind,
        reason: &str,
    ) -> Result<(), OrchestratorError> {
        let from = record.stage;
        let job = record.active_job.take();

        record.stage = stage;
        record.failure_kind = Some(kind);
        record.failure_reason = Some(reason.to_string());
        record.updated_at = SystemTime::now();
        session.save(record).await?;
        self.metrics.stage_entered(stage);

        let batch_id = record.batch_id.clone();
        let event = if stage == Stage::TimedOut {
            warn!(stage = %from, "batch timed out");
            BatchEvent::TimedOut {
                batch_id,
                stage: from,
                deadline: record.liveness_deadline,
            }
        } else {
            warn!(stage = %from, %kind, reason, "batch failed");
            BatchEvent::Failed {
                batch_id,
                stage: from,
                kind,
                reason: reason.to_string(),
            }
        };
        self.emit(event).await;

        for job in self.reclaimable_jobs(&record.batch_id, from, job) {
            if let Err(e) = self.jobs.delete_job(&job).await {
                warn!(job = %job, error = %e, "failed to delete job of terminated batch");
            }
        }
        Ok(())
    }

    /// The recorded job plus the pods of roles at or after `from`, without duplicates.
    fn reclaimable_jobs(&self, batch_id: &BatchId, from: Stage, active: Option<JobHandle>) -> Vec<JobHandle> {
        let mut jobs: Vec<JobHandle> = active.into_iter().collect();
        for role in JobRole::ALL {
            let stage = role.stage();
            if stage != from && from.has_reached(stage) {
                continue;
            }
            let handle = self.jobs.handle(role, batch_id);
            if !jobs.contains(&handle) {
                jobs.push(handle);
            }
        }
        jobs
    }

    async fn emit(&self, event: BatchEvent) {
        let action = match BroadcastAction::from_event(&event) {
            Ok(action) => action,
            Err(e) => {
                warn!(action = event.action_type(), error = %e, "failed to encode broadcast action");
                return;
            }
        };
        if let Err(e) = self.broadcaster.broadcast(&action).await {
            warn!(
                action = %action.action_type,
                broadcaster = self.broadcaster.name(),
                error = %e,
                "broadcast failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::Receiver;

    use super::*;
    use crate::{
        broadcast::ChannelBroadcaster,
        cluster::InMemoryCluster,
        store::{InMemoryStore, StoreOp},
    };

    struct Harness {
        store: Arc<InMemoryStore>,
        cluster: Arc<InMemoryCluster>,
        actions: Receiver<BroadcastAction>,
        orch: BatchOrchestrator,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let cluster = Arc::new(InMemoryCluster::new());
        let channel = ChannelBroadcaster::new(64);
        let actions = channel.subscribe();

        let ctx = OrchestratorContext::new(store.clone(), cluster.clone())
            .with_broadcaster(Arc::new(channel));
        let orch = BatchOrchestrator::from_context(&ctx, &CoreConfig::default());
        Harness {
            store,
            cluster,
            actions,
            orch,
        }
    }

    fn drain(rx: &mut Receiver<BroadcastAction>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(action) = rx.try_recv() {
            out.push(action.action_type);
        }
        out
    }

    async fn stage_of(h: &Harness, id: &BatchId) -> Stage {
        h.orch.state().get(id).await.unwrap().unwrap().stage
    }

    #[tokio::test]
    async fn start_submits_reader() {
        let mut h = harness();
        let id = BatchId::from("b-1");

        let out = h.orch.start(&id, "s3://bucket/a.step").await.unwrap();
        assert_eq!(out, Outcome::Applied(Stage::ReaderRunning));

        let rec = h.orch.state().get(&id).await.unwrap().unwrap();
        assert_eq!(rec.stage, Stage::ReaderRunning);
        assert_eq!(rec.active_job.unwrap().role, JobRole::Reader);
        assert_eq!(h.cluster.running(), vec!["cad-reader-b-1"]);
        assert_eq!(drain(&mut h.actions), vec!["batch.started"]);
    }

    #[tokio::test]
    async fn duplicate_start_is_ignored() {
        let mut h = harness();
        let id = BatchId::from("b-1");
        h.orch.start(&id, "s3://bucket/a.step").await.unwrap();
        drain(&mut h.actions);

        let out = h.orch.start(&id, "s3://bucket/other.step").await.unwrap();
        assert_eq!(out, Outcome::Ignored(Stage::ReaderRunning));
        assert_eq!(h.cluster.submitted().len(), 1);
        assert_eq!(drain(&mut h.actions), vec!["batch.ignored"]);
    }

    #[tokio::test]
    async fn full_pipeline_completes() {
        let mut h = harness();
        let id = BatchId::from("b-1");
        h.orch.start(&id, "s3://bucket/a.step").await.unwrap();

        let out = h
            .orch
            .on_stage_complete(&id, Stage::ReaderRunning, vec!["parsed.json".into()])
            .await
            .unwrap();
        assert_eq!(out, Outcome::Applied(Stage::WorkerRunning));

        let out = h
            .orch
            .handle_completion(StageCompletion {
                batch_id: id.clone(),
                stage: Stage::WorkerRunning,
                output_refs: vec!["mesh.glb".into()],
            })
            .await
            .unwrap();
        assert_eq!(out, Outcome::Applied(Stage::OptimizerRunning));

        let optimizer = h.cluster.submitted().pop().unwrap();
        assert_eq!(
            optimizer.container("optimizer").unwrap().args,
            vec!["--batch-id", "b-1", "--input", "mesh.glb"]
        );

        let out = h
            .orch
            .on_stage_complete(&id, Stage::OptimizerRunning, vec!["final.glb".into()])
            .await
            .unwrap();
        assert_eq!(out, Outcome::Applied(Stage::Completed));

        let rec = h.orch.state().get(&id).await.unwrap().unwrap();
        assert_eq!(rec.output_refs, vec!["final.glb"]);
        assert!(rec.active_job.is_none());
        assert_eq!(
            drain(&mut h.actions),
            vec!["batch.started", "batch.advanced", "batch.advanced", "batch.completed"]
        );
    }

    #[tokio::test]
    async fn out_of_order_completion_is_ignored() {
        let mut h = harness();
        let id = BatchId::from("b-1");
        h.orch.start(&id, "s3://bucket/a.step").await.unwrap();
        drain(&mut h.actions);

        let out = h
            .orch
            .on_stage_complete(&id, Stage::WorkerRunning, vec![])
            .await
            .unwrap();
        assert_eq!(out, Outcome::Ignored(Stage::ReaderRunning));
        assert_eq!(stage_of(&h, &id).await, Stage::ReaderRunning);
        assert_eq!(drain(&mut h.actions), vec!["batch.ignored"]);
    }

    #[tokio::test]
    async fn completion_for_unknown_batch_is_protocol_error() {
        let h = harness();
        let err = h
            .orch
            .on_stage_complete(&BatchId::from("ghost"), Stage::ReaderRunning, vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn fail_deletes_active_job() {
        let mut h = harness();
        let id = BatchId::from("b-1");
        h.orch.start(&id, "s3://bucket/a.step").await.unwrap();
        drain(&mut h.actions);

        let out = h.orch.fail(&id, "reader crashed").await.unwrap();
        assert_eq!(out, Outcome::Applied(Stage::Failed));
        assert!(h.cluster.running().is_empty());

        let rec = h.orch.state().get(&id).await.unwrap().unwrap();
        assert_eq!(rec.failure_reason.as_deref(), Some("reader crashed"));
        assert_eq!(rec.failure_kind, Some(ErrorKind::Reported));
        assert_eq!(drain(&mut h.actions), vec!["batch.failed"]);

        let again = h.orch.fail(&id, "again").await.unwrap();
        assert_eq!(again, Outcome::Ignored(Stage::Failed));
        let repeated = h.actions.try_recv().unwrap().event().unwrap();
        assert_eq!(
            repeated,
            BatchEvent::Ignored {
                batch_id: id.clone(),
                reported: Stage::Failed,
                current: Stage::Failed,
            }
        );
    }

    #[tokio::test]
    async fn fail_survives_delete_errors() {
        let h = harness();
        let id = BatchId::from("b-1");
        h.orch.start(&id, "s3://bucket/a.step").await.unwrap();
        h.cluster.fail_deletes(true);

        let out = h.orch.fail(&id, "operator abort").await.unwrap();
        assert_eq!(out, Outcome::Applied(Stage::Failed));
        assert_eq!(stage_of(&h, &id).await, Stage::Failed);
    }

    #[tokio::test]
    async fn transient_submit_failures_are_retried() {
        let h = harness();
        let id = BatchId::from("b-1");
        h.cluster.fail_next_submits(2);

        let out = h.orch.start(&id, "s3://bucket/a.step").await.unwrap();
        assert_eq!(out, Outcome::Applied(Stage::ReaderRunning));

        let rec = h.orch.state().get(&id).await.unwrap().unwrap();
        assert_eq!(rec.retry_count, 2);
    }

    #[tokio::test]
    async fn exhausted_submits_fail_the_batch() {
        let mut h = harness();
        let id = BatchId::from("b-1");
        h.cluster.fail_next_submits(3);

        let out = h.orch.start(&id, "s3://bucket/a.step").await.unwrap();
        assert_eq!(out, Outcome::Applied(Stage::Failed));

        let rec = h.orch.state().get(&id).await.unwrap().unwrap();
        assert_eq!(rec.retry_count, 3);
        assert_eq!(rec.failure_kind, Some(ErrorKind::Cluster));
        assert_eq!(drain(&mut h.actions), vec!["batch.failed"]);
    }

    #[tokio::test]
    async fn time_out_rechecks_deadline() {
        let mut h = harness();
        let id = BatchId::from("b-1");
        h.orch.start(&id, "s3://bucket/a.step").await.unwrap();
        drain(&mut h.actions);

        let now = SystemTime::now();
        let out = h.orch.time_out(&id, now).await.unwrap();
        assert_eq!(out, Outcome::Ignored(Stage::ReaderRunning));

        let later = now + Duration::from_secs(3_600);
        let out = h.orch.time_out(&id, later).await.unwrap();
        assert_eq!(out, Outcome::Applied(Stage::TimedOut));
        assert!(h.cluster.running().is_empty());
        assert_eq!(drain(&mut h.actions), vec!["batch.ignored", "batch.timed_out"]);

        let late = h
            .orch
            .on_stage_complete(&id, Stage::ReaderRunning, vec!["parsed.json".into()])
            .await
            .unwrap();
        assert_eq!(late, Outcome::Ignored(Stage::TimedOut));
    }

    #[tokio::test]
    async fn store_failure_is_reported_and_lock_released() {
        let h = harness();
        let id = BatchId::from("b-1");
        h.orch.start(&id, "s3://bucket/a.step").await.unwrap();

        h.store.fail_on(StoreOp::SetMany, true);
        let err = h
            .orch
            .on_stage_complete(&id, Stage::ReaderRunning, vec![])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);

        h.store.fail_on(StoreOp::SetMany, false);
        let out = h
            .orch
            .on_stage_complete(&id, Stage::ReaderRunning, vec![])
            .await
            .unwrap();
        assert_eq!(out, Outcome::Applied(Stage::WorkerRunning));
    }

    #[tokio::test]
    async fn time_out_reclaims_job_submitted_before_failed_save() {
        let h = harness();
        let id = BatchId::from("b-1");
        h.orch.start(&id, "s3://bucket/a.step").await.unwrap();

        h.store.fail_on(StoreOp::SetMany, true);
        h.orch
            .on_stage_complete(&id, Stage::ReaderRunning, vec!["parsed.json".into()])
            .await
            .unwrap_err();
        h.store.fail_on(StoreOp::SetMany, false);

        let rec = h.orch.state().get(&id).await.unwrap().unwrap();
        assert_eq!(rec.stage, Stage::ReaderRunning);
        assert_eq!(h.cluster.running(), vec!["cad-reader-b-1", "cad-worker-b-1"]);

        let later = SystemTime::now() + Duration::from_secs(3_600);
        let out = h.orch.time_out(&id, later).await.unwrap();
        assert_eq!(out, Outcome::Applied(Stage::TimedOut));
        assert!(h.cluster.running().is_empty());
    }

    #[tokio::test]
    async fn failing_one_batch_leaves_a_similarly_named_batch_alone() {
        let h = harness();
        let upper = BatchId::from("Batch_42");
        let lower = BatchId::from("batch-42");
        h.orch.start(&upper, "s3://bucket/a.step").await.unwrap();
        h.orch.start(&lower, "s3://bucket/b.step").await.unwrap();
        assert_eq!(h.cluster.submitted().len(), 2);

        h.orch.fail(&lower, "bad input").await.unwrap();

        assert_eq!(stage_of(&h, &upper).await, Stage::ReaderRunning);
        let upper_job = h.orch.state().get(&upper).await.unwrap().unwrap().active_job.unwrap();
        assert_eq!(h.cluster.running(), vec![upper_job.name]);
    }

    #[test]
    fn config_defaults() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.submit_attempts, 3);
        assert_eq!(cfg.state_config().terminal_retention_ms, 86_400_000);
        assert_eq!(cfg.stage_timeout(), Duration::from_secs(600));
    }
}
