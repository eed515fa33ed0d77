//! Prometheus metrics for the scheduler (SPEC_FULL.md §2 ambient stack):
//! sessions by liveness, jobs by status, deployments by status, queue
//! depth, and dispatcher tick latency. Gauges are refreshed from a
//! consistent snapshot at scrape time rather than incremented at every
//! mutation site, matching how the teacher's registry exposes its own
//! point-in-time `RegistryStats`/`DeploymentStats`.

use crate::deployment_registry::DeploymentStats;
use crate::queue::QueueStats;
use crate::registry::RegistryStats;
use prometheus::{
    opts, register_histogram_with_registry, register_int_gauge_with_registry, Histogram, IntGauge, Registry,
    TextEncoder,
};
use std::sync::Arc;

pub struct Metrics {
    registry: Registry,

    sessions_fresh: IntGauge,
    sessions_stale: IntGauge,
    sessions_dead: IntGauge,

    jobs_pending: IntGauge,
    jobs_reserved: IntGauge,
    jobs_assigned: IntGauge,
    jobs_running: IntGauge,
    jobs_completed: IntGauge,
    jobs_failed: IntGauge,
    jobs_cancelled: IntGauge,
    jobs_timeout: IntGauge,
    queue_pending_depth: IntGauge,

    deployments_pending: IntGauge,
    deployments_deploying: IntGauge,
    deployments_running: IntGauge,
    deployments_completed: IntGauge,
    deployments_failed: IntGauge,
    deployments_cancelled: IntGauge,

    dispatcher_tick_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        macro_rules! gauge {
            ($name:literal, $help:literal) => {
                register_int_gauge_with_registry!(opts!($name, $help), registry)?
            };
        }

        Ok(Arc::new(Self {
            sessions_fresh: gauge!("orchestrator_sessions_fresh", "Live worker sessions with a fresh heartbeat"),
            sessions_stale: gauge!("orchestrator_sessions_stale", "Live worker sessions with a stale heartbeat"),
            sessions_dead: gauge!("orchestrator_sessions_dead", "Sessions swept as dead in the last sweep pass"),

            jobs_pending: gauge!("orchestrator_jobs_pending", "Jobs awaiting assignment"),
            jobs_reserved: gauge!("orchestrator_jobs_reserved", "Jobs reserved to a session, not yet sent"),
            jobs_assigned: gauge!("orchestrator_jobs_assigned", "Jobs sent to a worker, awaiting result"),
            jobs_running: gauge!("orchestrator_jobs_running", "Jobs a worker has signalled as running"),
            jobs_completed: gauge!("orchestrator_jobs_completed", "Jobs completed successfully"),
            jobs_failed: gauge!("orchestrator_jobs_failed", "Jobs that failed terminally"),
            jobs_cancelled: gauge!("orchestrator_jobs_cancelled", "Jobs cancelled by caller or cascade"),
            jobs_timeout: gauge!("orchestrator_jobs_timeout", "Jobs that exhausted their timeout budget"),
            queue_pending_depth: gauge!("orchestrator_queue_pending_depth", "Depth of the pending FIFO"),

            deployments_pending: gauge!("orchestrator_deployments_pending", "Deployments not yet deploying"),
            deployments_deploying: gauge!("orchestrator_deployments_deploying", "Deployments whose coordinator just started"),
            deployments_running: gauge!("orchestrator_deployments_running", "Deployments with at least one node in flight"),
            deployments_completed: gauge!("orchestrator_deployments_completed", "Deployments that completed successfully"),
            deployments_failed: gauge!("orchestrator_deployments_failed", "Deployments that failed"),
            deployments_cancelled: gauge!("orchestrator_deployments_cancelled", "Deployments cancelled by caller"),

            dispatcher_tick_duration_seconds: register_histogram_with_registry!(
                "orchestrator_dispatcher_tick_duration_seconds",
                "Wall time of one dispatcher sweep+tick pass",
                vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0],
                registry
            )?,
            registry,
        }))
    }

    pub fn refresh_sessions(&self, stats: RegistryStats) {
        self.sessions_fresh.set(stats.fresh as i64);
        self.sessions_stale.set(stats.stale as i64);
        self.sessions_dead.set(stats.dead as i64);
    }

    pub fn refresh_jobs(&self, stats: QueueStats, pending_depth: usize) {
        self.jobs_pending.set(stats.pending as i64);
        self.jobs_reserved.set(stats.reserved as i64);
        self.jobs_assigned.set(stats.assigned as i64);
        self.jobs_running.set(stats.running as i64);
        self.jobs_completed.set(stats.completed as i64);
        self.jobs_failed.set(stats.failed as i64);
        self.jobs_cancelled.set(stats.cancelled as i64);
        self.jobs_timeout.set(stats.timeout as i64);
        self.queue_pending_depth.set(pending_depth as i64);
    }

    pub fn refresh_deployments(&self, stats: DeploymentStats) {
        self.deployments_pending.set(stats.pending as i64);
        self.deployments_deploying.set(stats.deploying as i64);
        self.deployments_running.set(stats.running as i64);
        self.deployments_completed.set(stats.completed as i64);
        self.deployments_failed.set(stats.failed as i64);
        self.deployments_cancelled.set(stats.cancelled as i64);
    }

    pub fn record_tick_duration(&self, seconds: f64) {
        self.dispatcher_tick_duration_seconds.observe(seconds);
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        encoder.encode_to_string(&self.registry.gather())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_and_export_round_trips() {
        let metrics = Metrics::new().unwrap();
        metrics.refresh_sessions(RegistryStats { fresh: 2, stale: 1, dead: 0 });
        metrics.refresh_jobs(QueueStats { pending: 3, ..Default::default() }, 3);
        metrics.record_tick_duration(0.004);

        let exported = metrics.export().unwrap();
        assert!(exported.contains("orchestrator_sessions_fresh 2"));
        assert!(exported.contains("orchestrator_jobs_pending 3"));
        assert!(exported.contains("orchestrator_dispatcher_tick_duration_seconds"));
    }
}
