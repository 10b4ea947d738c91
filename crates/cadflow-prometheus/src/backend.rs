use prometheus::{IntCounter, IntCounterVec, Opts, Registry, proto::MetricFamily};

use cadflow_core::MetricsBackend;
use cadflow_model::{JobRole, Stage};

/// Counter set registered on a private registry. Cheap to clone.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    lock_acquisitions: IntCounterVec,
    lock_release_failures: IntCounter,
    jobs_submitted: IntCounterVec,
    stage_transitions: IntCounterVec,
    batches_terminal: IntCounterVec,
    sweeps: IntCounter,
    sweep_timeouts: IntCounter,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let lock_acquisitions = counter_vec(
            &registry,
            "cadflow_lock_acquisitions_total",
            "Batch locks acquired, by acquisition mode",
            &["mode"],
        )?;
        let lock_release_failures = counter(
            &registry,
            "cadflow_lock_release_failures_total",
            "Lock releases that found the key missing or reassigned",
        )?;
        let jobs_submitted = counter_vec(
            &registry,
            "cadflow_jobs_submitted_total",
            "Stage job submissions, by role and outcome",
            &["role", "outcome"],
        )?;
        let stage_transitions = counter_vec(
            &registry,
            "cadflow_stage_transitions_total",
            "Batch records entering a stage",
            &["stage"],
        )?;
        let batches_terminal = counter_vec(
            &registry,
            "cadflow_batches_terminal_total",
            "Batches reaching a terminal stage",
            &["stage"],
        )?;
        let sweeps = counter(&registry, "cadflow_sweeps_total", "Timeout sweep passes")?;
        let sweep_timeouts = counter(
            &registry,
            "cadflow_sweep_timeouts_total",
            "Batches timed out by the sweeper",
        )?;

        Ok(Self {
            registry,
            lock_acquisitions,
            lock_release_failures,
            jobs_submitted,
            stage_transitions,
            batches_terminal,
            sweeps,
            sweep_timeouts,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let c = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

fn counter_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec, prometheus::Error> {
    let c = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl MetricsBackend for PrometheusMetrics {
    fn lock_acquired(&self, stolen: bool) {
        let mode = if stolen { "stolen" } else { "normal" };
        self.lock_acquisitions.with_label_values(&[mode]).inc();
    }

    fn lock_release_failed(&self) {
        self.lock_release_failures.inc();
    }

    fn job_submitted(&self, role: JobRole, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.jobs_submitted
            .with_label_values(&[role.as_str(), outcome])
            .inc();
    }

    fn stage_entered(&self, stage: Stage) {
        self.stage_transitions
            .with_label_values(&[stage.as_str()])
            .inc();
        if stage.is_terminal() {
            self.batches_terminal.with_label_values(&[stage.as_str()]).inc();
        }
    }

    fn sweep_completed(&self, timed_out: usize) {
        self.sweeps.inc();
        self.sweep_timeouts.inc_by(timed_out as u64);
    }
}

#[cfg(test)]
mod tests {
    use prometheus::{Encoder, TextEncoder};

    use super::*;

    fn render(m: &PrometheusMetrics) -> String {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&m.gather(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn records_lifecycle_counters() {
        let m = PrometheusMetrics::new().unwrap();
        m.lock_acquired(false);
        m.lock_acquired(true);
        m.job_submitted(JobRole::Worker, true);
        m.stage_entered(Stage::WorkerRunning);
        m.stage_entered(Stage::TimedOut);
        m.sweep_completed(2);

        assert_eq!(m.lock_acquisitions.with_label_values(&["stolen"]).get(), 1);
        assert_eq!(m.jobs_submitted.with_label_values(&["worker", "ok"]).get(), 1);
        assert_eq!(m.batches_terminal.with_label_values(&["timedOut"]).get(), 1);
        assert_eq!(m.batches_terminal.with_label_values(&["workerRunning"]).get(), 0);
        assert_eq!(m.sweep_timeouts.get(), 2);

        let text = render(&m);
        assert!(text.contains("cadflow_lock_acquisitions_total{mode=\"normal\"} 1"));
        assert!(text.contains("cadflow_sweeps_total 1"));
    }

    #[test]
    fn instances_do_not_share_registries() {
        let a = PrometheusMetrics::new().unwrap();
        let b = PrometheusMetrics::new().unwrap();
        a.lock_release_failed();
        assert_eq!(a.lock_release_failures.get(), 1);
        assert_eq!(b.lock_release_failures.get(), 0);
    }
}
