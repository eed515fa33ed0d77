//! Dispatcher (spec.md §4.8): the single task that serializes Node Registry
//! and Job Queue mutation. Every state change elsewhere in the scheduler
//! posts a `DispatchEvent` instead of taking a lock; this task drains that
//! channel and, on every wake, runs one `sweep` + `tick` pass. A periodic
//! timer guarantees a sweep happens even if nothing posts an event.

use crate::events::DispatchEvent;
use crate::metrics::Metrics;
use crate::queue::JobQueue;
use crate::registry::NodeRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Upper bound on how long a dead session can go undetected with no other
/// activity to wake the dispatcher.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

pub struct Dispatcher {
    registry: Arc<NodeRegistry>,
    queue: Arc<JobQueue>,
    receiver: mpsc::UnboundedReceiver<DispatchEvent>,
    metrics: Option<Arc<Metrics>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<NodeRegistry>, queue: Arc<JobQueue>, receiver: mpsc::UnboundedReceiver<DispatchEvent>) -> Self {
        Self { registry, queue, receiver, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs until the event channel closes (every `EventSink` handle has been
    /// dropped). Intended to be spawned as its own `tokio::task`.
    pub async fn run(mut self) {
        let mut sweep_timer = tokio::time::interval(SWEEP_INTERVAL);
        sweep_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.receiver.recv() => {
                    match event {
                        Some(event) => self.handle(event).await,
                        None => {
                            tracing::info!("dispatcher event channel closed, shutting down");
                            break;
                        }
                    }
                }
                _ = sweep_timer.tick() => {
                    self.pass().await;
                }
            }
        }
    }

    async fn handle(&self, event: DispatchEvent) {
        tracing::debug!(?event, "dispatcher woke");
        self.pass().await;
    }

    async fn pass(&self) {
        let started = Instant::now();

        let lost_jobs = self.registry.sweep();
        if !lost_jobs.is_empty() {
            tracing::warn!(count = lost_jobs.len(), "requeueing jobs from lost worker sessions");
            self.queue.requeue_lost(lost_jobs).await;
        }
        self.queue.tick().await;

        if let Some(metrics) = &self.metrics {
            metrics.refresh_sessions(self.registry.stats());
            metrics.refresh_jobs(self.queue.stats(), self.queue.pending_depth().await);
            metrics.record_tick_duration(started.elapsed().as_secs_f64());
        }
    }
}
