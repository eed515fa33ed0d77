//! Outbound half of the Worker Session protocol (spec.md §4.3): a registry
//! of live connections the Job Queue and Flow Deployment Engine send
//! `job_assignment` / `job_cancelled` messages through, without knowing
//! anything about the underlying transport (a WebSocket, in `orchestratord`).

use dashmap::DashMap;
use orchestrator_protocol::Outbound;
use orchestrator_types::SessionId;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
#[error("worker session {0} is not connected")]
pub struct SendError(pub SessionId);

#[derive(Default)]
pub struct WorkerConnections {
    senders: DashMap<SessionId, mpsc::UnboundedSender<Outbound>>,
}

impl WorkerConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, session_id: SessionId, sender: mpsc::UnboundedSender<Outbound>) {
        self.senders.insert(session_id, sender);
    }

    pub fn detach(&self, session_id: SessionId) {
        self.senders.remove(&session_id);
    }

    pub fn is_connected(&self, session_id: SessionId) -> bool {
        self.senders.contains_key(&session_id)
    }

    pub fn send(&self, session_id: SessionId, message: Outbound) -> Result<(), SendError> {
        let sender = self.senders.get(&session_id).ok_or(SendError(session_id))?;
        sender.send(message).map_err(|_| SendError(session_id))
    }
}
