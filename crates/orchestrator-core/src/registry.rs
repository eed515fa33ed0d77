//! Node Registry (spec.md §4.2): live worker sessions keyed by node-id and
//! session-id, with capability, liveness, and resource-limit state.
//!
//! Backed by `DashMap` rather than a `RwLock<HashMap>` — heartbeats and
//! eligibility scans vastly outnumber registrations, and concurrent worker
//! sessions each touch their own entry independently.

use crate::events::{DispatchEvent, EventSink};
use crate::matcher;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use orchestrator_types::{
    generate_share_key, CapabilityRecord, Clock, JobId, JobRequirements, Liveness, NodeId,
    ResourceLimits, SchedulerError, SessionId, ShareKey, WorkerSession, WorkspaceId,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct LivenessConfig {
    pub fresh_after: Duration,
    pub stale_after: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            fresh_after: Duration::from_secs(30),
            stale_after: Duration::from_secs(90),
        }
    }
}

/// Outcome of a `Heartbeat` call, so the worker session layer knows whether
/// to ask the worker to re-register.
pub enum HeartbeatOutcome {
    Ok,
    ReregisterRequired,
    DeadSessionDropped,
}

pub struct NodeRegistry {
    sessions_by_session_id: DashMap<SessionId, WorkerSession>,
    session_by_node_id: DashMap<NodeId, SessionId>,
    session_by_share_key: DashMap<ShareKey, SessionId>,
    liveness: LivenessConfig,
    clock: Arc<dyn Clock>,
    events: EventSink,
}

pub struct RegisterOutcome {
    pub session_id: SessionId,
    pub node_id: NodeId,
    pub share_key: ShareKey,
    /// Session-ids evicted because they shared this node-id; their jobs must
    /// be requeued by the caller (the Job Queue, via the returned ids).
    pub evicted_jobs: HashSet<JobId>,
}

impl NodeRegistry {
    pub fn new(clock: Arc<dyn Clock>, events: EventSink) -> Self {
        Self::with_liveness(clock, events, LivenessConfig::default())
    }

    pub fn with_liveness(clock: Arc<dyn Clock>, events: EventSink, liveness: LivenessConfig) -> Self {
        Self {
            sessions_by_session_id: DashMap::new(),
            session_by_node_id: DashMap::new(),
            session_by_share_key: DashMap::new(),
            liveness,
            clock,
            events,
        }
    }

    pub fn register(
        &self,
        node_id: NodeId,
        capability: CapabilityRecord,
        workspace_ids: Vec<WorkspaceId>,
        resource_limits: Option<ResourceLimits>,
        share_key: Option<ShareKey>,
    ) -> Result<RegisterOutcome, SchedulerError> {
        let mut workspace_bindings: HashSet<WorkspaceId> = workspace_ids.into_iter().collect();

        if let Some(key) = &share_key {
            let bound_session = self.session_by_share_key.get(key).map(|e| *e.value());
            match bound_session {
                Some(sid) => {
                    if let Some(existing) = self.sessions_by_session_id.get_mut(&sid) {
                        if let Some(ws) = existing.workspace_bindings.iter().next().copied() {
                            workspace_bindings.insert(ws);
                        }
                    }
                }
                None => return Err(SchedulerError::ShareKeyNotFound),
            }
        }

        let evicted_jobs = self.evict_by_node_id(&node_id);

        let session_id = SessionId::new();
        let new_share_key = generate_share_key();
        let now = self.clock.now();

        let session = WorkerSession {
            session_id,
            node_id: node_id.clone(),
            capability,
            workspace_bindings,
            share_key: new_share_key.clone(),
            share_key_consumed: false,
            liveness: Liveness::Fresh,
            last_heartbeat: now,
            current_jobs: HashSet::new(),
            resource_limits: resource_limits.unwrap_or_default(),
            remote_control_enabled: false,
            registered_at: now,
        };

        self.sessions_by_session_id.insert(session_id, session);
        self.session_by_node_id.insert(node_id.clone(), session_id);
        self.session_by_share_key.insert(new_share_key.clone(), session_id);

        self.events.emit(DispatchEvent::WorkerRegistered(session_id));

        Ok(RegisterOutcome {
            session_id,
            node_id,
            share_key: new_share_key,
            evicted_jobs,
        })
    }

    /// Evicts any live session with the given node-id, returning the jobs
    /// that were assigned to it (the Job Queue must requeue them).
    fn evict_by_node_id(&self, node_id: &NodeId) -> HashSet<JobId> {
        let Some((_, old_session_id)) = self.session_by_node_id.remove(node_id) else {
            return HashSet::new();
        };
        let Some((_, old_session)) = self.sessions_by_session_id.remove(&old_session_id) else {
            return HashSet::new();
        };
        self.session_by_share_key.remove(&old_session.share_key);
        old_session.current_jobs
    }

    /// Evicts a session immediately on transport close, without waiting for
    /// the next liveness sweep. Returns the jobs it held so the caller can
    /// requeue them with reason `WorkerLost` (spec.md §4.3 Reconnect, §5).
    pub fn disconnect(&self, session_id: SessionId) -> Vec<JobId> {
        let Some((_, session)) = self.sessions_by_session_id.remove(&session_id) else {
            return Vec::new();
        };
        // The node may already have reconnected under a new session_id by the
        // time the old transport's close is observed; only drop the
        // node_id mapping if it still points at the session that's closing.
        self.session_by_node_id.remove_if(&session.node_id, |_, sid| *sid == session_id);
        self.session_by_share_key.remove(&session.share_key);
        self.events.emit(DispatchEvent::WorkerLost(session_id));
        session.current_jobs.into_iter().collect()
    }

    pub fn heartbeat(&self, session_id: SessionId, current_jobs_count: u32) -> HeartbeatOutcome {
        let _ = current_jobs_count;
        let Some(mut session) = self.sessions_by_session_id.get_mut(&session_id) else {
            return HeartbeatOutcome::ReregisterRequired;
        };
        if session.liveness == Liveness::Dead {
            return HeartbeatOutcome::DeadSessionDropped;
        }
        session.last_heartbeat = self.clock.now();
        session.liveness = Liveness::Fresh;
        self.events.emit(DispatchEvent::Heartbeat(session_id));
        HeartbeatOutcome::Ok
    }

    pub fn update_limits(&self, session_id: SessionId, limits: ResourceLimits) -> Result<(), SchedulerError> {
        let mut session = self
            .sessions_by_session_id
            .get_mut(&session_id)
            .ok_or_else(|| SchedulerError::SessionNotFound(session_id.to_string()))?;
        session.resource_limits = limits;
        drop(session);
        self.events.emit(DispatchEvent::CapacityChanged(session_id));
        Ok(())
    }

    pub fn update_workspaces(&self, session_id: SessionId, workspace_ids: Vec<WorkspaceId>) -> Result<(), SchedulerError> {
        let mut session = self
            .sessions_by_session_id
            .get_mut(&session_id)
            .ok_or_else(|| SchedulerError::SessionNotFound(session_id.to_string()))?;
        session.workspace_bindings = workspace_ids.into_iter().collect();
        drop(session);
        self.events.emit(DispatchEvent::CapacityChanged(session_id));
        Ok(())
    }

    pub fn consume_share_key(&self, share_key: &ShareKey, workspace_id: WorkspaceId) -> Result<SessionId, SchedulerError> {
        let session_id = *self
            .session_by_share_key
            .get(share_key)
            .ok_or(SchedulerError::ShareKeyNotFound)?
            .value();
        let mut session = self
            .sessions_by_session_id
            .get_mut(&session_id)
            .ok_or(SchedulerError::ShareKeyNotFound)?;
        session.workspace_bindings.insert(workspace_id);
        session.share_key_consumed = true;
        Ok(session_id)
    }

    pub fn get(&self, session_id: SessionId) -> Option<WorkerSession> {
        self.sessions_by_session_id.get(&session_id).map(|e| e.value().clone())
    }

    pub fn session_id_for_node(&self, node_id: &NodeId) -> Option<SessionId> {
        self.session_by_node_id.get(node_id).map(|e| *e.value())
    }

    pub fn add_current_job(&self, session_id: SessionId, job_id: JobId) {
        if let Some(mut s) = self.sessions_by_session_id.get_mut(&session_id) {
            s.current_jobs.insert(job_id);
        }
    }

    pub fn remove_current_job(&self, session_id: SessionId, job_id: JobId) {
        if let Some(mut s) = self.sessions_by_session_id.get_mut(&session_id) {
            s.current_jobs.remove(&job_id);
        }
    }

    /// Sessions passing the Capability Matcher and affinity check, ordered by:
    /// workspace-affinity exact match before public, then fewer current jobs,
    /// then earliest last-heartbeat (fairness).
    pub fn eligible(&self, requirements: &JobRequirements) -> Vec<WorkerSession> {
        let mut candidates: Vec<WorkerSession> = self
            .sessions_by_session_id
            .iter()
            .filter(|e| e.liveness != Liveness::Dead)
            .filter(|e| matcher::matches(requirements, e.value()))
            .map(|e| e.value().clone())
            .collect();

        candidates.sort_by(|a, b| {
            let a_bound = requirements.affinity.map(|ws| a.workspace_bindings.contains(&ws)).unwrap_or(false);
            let b_bound = requirements.affinity.map(|ws| b.workspace_bindings.contains(&ws)).unwrap_or(false);
            b_bound
                .cmp(&a_bound)
                .then(a.current_jobs.len().cmp(&b.current_jobs.len()))
                .then(a.last_heartbeat.cmp(&b.last_heartbeat))
        });

        candidates
    }

    /// Transitions stale/dead sessions and returns the jobs owned by
    /// sessions that just died, so the Job Queue can requeue them with
    /// reason `WorkerLost`.
    pub fn sweep(&self) -> Vec<JobId> {
        let now = self.clock.now();
        let mut lost_jobs = Vec::new();
        let mut dead_node_ids = Vec::new();

        for mut entry in self.sessions_by_session_id.iter_mut() {
            let session = entry.value_mut();
            let age = age_of(session.last_heartbeat, now);
            session.liveness = classify(age, &self.liveness);
            if session.liveness == Liveness::Dead {
                lost_jobs.extend(session.current_jobs.iter().copied());
                dead_node_ids.push(session.node_id.clone());
            }
        }

        for node_id in dead_node_ids {
            if let Some((_, sid)) = self.session_by_node_id.remove(&node_id) {
                if let Some((_, session)) = self.sessions_by_session_id.remove(&sid) {
                    self.session_by_share_key.remove(&session.share_key);
                    self.events.emit(DispatchEvent::WorkerLost(sid));
                }
            }
        }

        lost_jobs
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for entry in self.sessions_by_session_id.iter() {
            match entry.liveness {
                Liveness::Fresh => stats.fresh += 1,
                Liveness::Stale => stats.stale += 1,
                Liveness::Dead => stats.dead += 1,
            }
        }
        stats
    }
}

fn age_of(last_heartbeat: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - last_heartbeat).to_std().unwrap_or(Duration::ZERO)
}

fn classify(age: Duration, config: &LivenessConfig) -> Liveness {
    if age <= config.fresh_after {
        Liveness::Fresh
    } else if age <= config.stale_after {
        Liveness::Stale
    } else {
        Liveness::Dead
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct RegistryStats {
    pub fresh: u64,
    pub stale: u64,
    pub dead: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_types::{CpuInfo, FixedClock, MemoryInfo, StorageInfo};
    use std::collections::HashSet as Set;

    fn cap() -> CapabilityRecord {
        CapabilityRecord {
            cpu: CpuInfo { model: "x".into(), cores: 4, threads: 4, features: vec![] },
            memory: MemoryInfo { total_mb: 8192, available_mb: 8192 },
            storage: StorageInfo { total_gb: 10, available_gb: 10 },
            gpus: vec![],
            adapters: Set::from(["docker".to_string()]),
        }
    }

    #[test]
    fn reregistration_evicts_old_session() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let registry = NodeRegistry::new(clock, EventSink::discard());
        let node = NodeId("worker-1".into());
        let first = registry.register(node.clone(), cap(), vec![], None, None).unwrap();
        registry.add_current_job(first.session_id, JobId::new());
        let second = registry.register(node.clone(), cap(), vec![], None, None).unwrap();
        assert_eq!(second.evicted_jobs.len(), 1);
        assert!(registry.get(first.session_id).is_none());
        assert!(registry.get(second.session_id).is_some());
    }

    #[test]
    fn sweep_transitions_liveness_and_requeues_dead_jobs() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let registry = NodeRegistry::with_liveness(
            clock.clone(),
            EventSink::discard(),
            LivenessConfig { fresh_after: Duration::from_secs(1), stale_after: Duration::from_secs(2) },
        );
        let outcome = registry.register(NodeId("w".into()), cap(), vec![], None, None).unwrap();
        let job = JobId::new();
        registry.add_current_job(outcome.session_id, job);

        clock.advance(chrono::Duration::seconds(3));
        let lost = registry.sweep();
        assert_eq!(lost, vec![job]);
        assert!(registry.get(outcome.session_id).is_none());
    }

    #[test]
    fn disconnect_evicts_session_immediately_and_returns_its_jobs() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let registry = NodeRegistry::new(clock, EventSink::discard());
        let outcome = registry.register(NodeId("w".into()), cap(), vec![], None, None).unwrap();
        let job = JobId::new();
        registry.add_current_job(outcome.session_id, job);

        let lost = registry.disconnect(outcome.session_id);
        assert_eq!(lost, vec![job]);
        assert!(registry.get(outcome.session_id).is_none());
        assert!(registry.session_id_for_node(&NodeId("w".into())).is_none());
    }

    #[test]
    fn disconnect_does_not_evict_a_node_that_already_reregistered() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let registry = NodeRegistry::new(clock, EventSink::discard());
        let node = NodeId("w".into());
        let first = registry.register(node.clone(), cap(), vec![], None, None).unwrap();
        let second = registry.register(node.clone(), cap(), vec![], None, None).unwrap();

        // The old session's transport-close handler observes its own
        // (now-stale) session_id; it must not clobber the new session's
        // node_id mapping.
        let lost = registry.disconnect(first.session_id);
        assert!(lost.is_empty());
        assert!(registry.get(second.session_id).is_some());
        assert_eq!(registry.session_id_for_node(&node), Some(second.session_id));
    }

    #[test]
    fn share_key_binds_workspace_once() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let registry = NodeRegistry::new(clock, EventSink::discard());
        let outcome = registry.register(NodeId("w".into()), cap(), vec![], None, None).unwrap();
        let ws = WorkspaceId::new();
        let sid = registry.consume_share_key(&outcome.share_key, ws).unwrap();
        assert_eq!(sid, outcome.session_id);
        let session = registry.get(sid).unwrap();
        assert!(session.workspace_bindings.contains(&ws));
    }
}
