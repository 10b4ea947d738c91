use cadflow_model::{JobRole, Stage};

/// Counters recorded by the orchestration core.
///
/// Implementations must be cheap and non-blocking; they run inside lock-held sections.
pub trait MetricsBackend: Send + Sync + 'static {
    /// A lock was taken, `stolen` when it was force-overwritten after retries ran out.
    fn lock_acquired(&self, stolen: bool);

    /// Release found the key gone or owned by someone else, or the store failed.
    fn lock_release_failed(&self);

    fn job_submitted(&self, role: JobRole, ok: bool);

    /// A batch record entered `stage`.
    fn stage_entered(&self, stage: Stage);

    fn sweep_completed(&self, timed_out: usize);
}

/// Backend that discards every measurement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {
    fn lock_acquired(&self, _stolen: bool) {}
    fn lock_release_failed(&self) {}
    fn job_submitted(&self, _role: JobRole, _ok: bool) {}
    fn stage_entered(&self, _stage: Stage) {}
    fn sweep_completed(&self, _timed_out: usize) {}
}
