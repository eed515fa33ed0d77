//! Dispatcher wake events (spec.md §4.8): posted rather than locked-across,
//! so Node Registry / Job Queue mutation stays serialized through the
//! Dispatcher's single event channel.

use orchestrator_types::{DeploymentId, JobId, SessionId};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum DispatchEvent {
    WorkerRegistered(SessionId),
    Heartbeat(SessionId),
    WorkerLost(SessionId),
    CapacityChanged(SessionId),
    JobSubmitted(JobId),
    JobCompleted(JobId),
    DeploymentSubmitted(DeploymentId),
    Sweep,
}

/// A cloneable handle to the dispatcher's event channel. Components that
/// mutate registry/queue state use this to wake the dispatcher instead of
/// acquiring a shared lock.
#[derive(Clone)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<DispatchEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::UnboundedSender<DispatchEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    /// A sink that drops every event; used in unit tests that don't run a
    /// dispatcher loop.
    pub fn discard() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: DispatchEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                tracing::warn!("dispatcher event channel closed; event dropped");
            }
        }
    }
}
