//! Job Queue (spec.md §4.4): a FIFO pending list behind a
//! `tokio::sync::Mutex<VecDeque<JobId>>` alongside a `DashMap<JobId, Job>`
//! for O(1) lookup — the same split the teacher's `ExecutionEngine` uses
//! between its `task_queue` and `running_tasks` maps.

use crate::accounts::AccountsGateway;
use crate::events::{DispatchEvent, EventSink};
use crate::registry::NodeRegistry;
use crate::session_transport::WorkerConnections;
use dashmap::DashMap;
use orchestrator_protocol::{JobAssignmentPayload, Outbound};
use orchestrator_types::{
    AccountId, Clock, ClientId, DeploymentId, FlowNodeId, Job, JobId, JobPayload, JobRequirements,
    JobResult, JobStatus, ReservationId, SchedulerError, SessionId, WorkspaceId,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Why a job is being requeued or terminally failed, for logging and for
/// the `JobResult.error` left on a job that exhausts its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    WorkerLost,
    TimedOut,
}

impl FailureReason {
    fn as_str(self) -> &'static str {
        match self {
            FailureReason::WorkerLost => "WorkerLost",
            FailureReason::TimedOut => "TimedOut",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub reserved: u64,
    pub assigned: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub timeout: u64,
}

pub struct SubmitRequest {
    pub client_id: ClientId,
    pub account_id: Option<AccountId>,
    pub workspace_id: Option<WorkspaceId>,
    pub requirements: JobRequirements,
    pub payload: JobPayload,
    pub timeout_seconds: u64,
    pub deployment_ref: Option<(DeploymentId, FlowNodeId)>,
}

pub struct JobQueue {
    jobs: DashMap<JobId, Job>,
    pending: Mutex<VecDeque<JobId>>,
    registry: Arc<NodeRegistry>,
    connections: Arc<WorkerConnections>,
    accounts: Arc<dyn AccountsGateway>,
    clock: Arc<dyn Clock>,
    events: EventSink,
    config: QueueConfig,
    /// Single-shot wakeups for whoever is awaiting a job's terminal result
    /// (the Flow Deployment Engine's per-node await). At most one subscriber
    /// per job is ever registered.
    waiters: DashMap<JobId, oneshot::Sender<()>>,
}

impl JobQueue {
    pub fn new(
        registry: Arc<NodeRegistry>,
        connections: Arc<WorkerConnections>,
        accounts: Arc<dyn AccountsGateway>,
        clock: Arc<dyn Clock>,
        events: EventSink,
    ) -> Self {
        Self::with_config(registry, connections, accounts, clock, events, QueueConfig::default())
    }

    pub fn with_config(
        registry: Arc<NodeRegistry>,
        connections: Arc<WorkerConnections>,
        accounts: Arc<dyn AccountsGateway>,
        clock: Arc<dyn Clock>,
        events: EventSink,
        config: QueueConfig,
    ) -> Self {
        Self {
            jobs: DashMap::new(),
            pending: Mutex::new(VecDeque::new()),
            registry,
            connections,
            accounts,
            clock,
            events,
            config,
            waiters: DashMap::new(),
        }
    }

    /// Reserves funds (if an account is attached) and enqueues the job as
    /// `pending`. Rejects up front on `InsufficientFunds` rather than
    /// accepting a job that can never be paid for.
    pub async fn submit(&self, request: SubmitRequest) -> Result<JobId, SchedulerError> {
        let job_id = JobId::new();
        let now = self.clock.now();

        let reservation_id = match request.account_id {
            Some(account_id) => Some(
                self.accounts
                    .reserve(account_id, request.requirements.max_cost_cents, &request.requirements.currency)
                    .await?,
            ),
            None => None,
        };

        let job = Job {
            job_id,
            client_id: request.client_id,
            account_id: request.account_id,
            workspace_id: request.workspace_id,
            requirements: request.requirements,
            payload: request.payload,
            timeout_seconds: request.timeout_seconds,
            status: JobStatus::Pending,
            assigned_session: None,
            enqueued_at: now,
            assigned_at: None,
            completed_at: None,
            attempts: 0,
            result: None,
            reservation_id,
            deployment_ref: request.deployment_ref,
        };

        self.jobs.insert(job_id, job);
        self.pending.lock().await.push_back(job_id);
        self.events.emit(DispatchEvent::JobSubmitted(job_id));
        Ok(job_id)
    }

    pub fn get(&self, job_id: JobId) -> Option<Job> {
        self.jobs.get(&job_id).map(|e| e.value().clone())
    }

    pub fn list(&self) -> Vec<Job> {
        self.jobs.iter().map(|e| e.value().clone()).collect()
    }

    pub fn list_for_client(&self, client_id: ClientId) -> Vec<Job> {
        self.jobs.iter().filter(|e| e.client_id == client_id).map(|e| e.value().clone()).collect()
    }

    /// Job counts by status plus the live pending-FIFO depth, for the
    /// `/stats` endpoint and Prometheus export.
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for entry in self.jobs.iter() {
            match entry.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Reserved => stats.reserved += 1,
                JobStatus::Assigned => stats.assigned += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
                JobStatus::Timeout => stats.timeout += 1,
            }
        }
        stats
    }

    /// Depth of the pending FIFO right now (distinct from `stats().pending`,
    /// which also counts jobs mid-reserve-and-assign under the same status).
    pub async fn pending_depth(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Registers a one-shot wakeup fired the moment this job reaches a
    /// terminal status. Used by the flow coordinator to await a node's job
    /// without polling.
    pub fn subscribe(&self, job_id: JobId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if let Some(job) = self.jobs.get(&job_id) {
            if job.status.is_terminal() {
                let _ = tx.send(());
                return rx;
            }
        }
        self.waiters.insert(job_id, tx);
        rx
    }

    fn wake_waiters(&self, job_id: JobId) {
        if let Some((_, tx)) = self.waiters.remove(&job_id) {
            let _ = tx.send(());
        }
    }

    /// Cancels a job unconditionally: terminal statuses are a no-op
    /// (returns `false`), otherwise the job becomes `cancelled`, its
    /// reservation is refunded in full, and — if assigned — the worker is
    /// told to abort. Unlike a timeout or worker loss, a caller-requested
    /// cancel never requeues.
    pub async fn cancel(&self, job_id: JobId) -> bool {
        let Some(mut job) = self.jobs.get_mut(&job_id) else { return false };
        if job.status.is_terminal() {
            return false;
        }

        let assigned_session = job.assigned_session;
        let reservation_id = job.reservation_id;
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(self.clock.now());
        drop(job);

        self.pending.lock().await.retain(|id| *id != job_id);

        if let Some(session_id) = assigned_session {
            self.registry.remove_current_job(session_id, job_id);
            let _ = self.connections.send(session_id, Outbound::JobCancelled { job_id });
        }

        if let Some(reservation_id) = reservation_id {
            let _ = self.accounts.refund(reservation_id).await;
        }

        self.wake_waiters(job_id);
        true
    }

    /// A worker's terminal `job_result`. Stale results (job no longer
    /// assigned to the reporting session, or already terminal) are ignored —
    /// the worker was already evicted or the job already cancelled.
    pub async fn on_result(
        &self,
        session_id: SessionId,
        job_id: JobId,
        success: bool,
        outputs: Option<serde_json::Value>,
        error: Option<String>,
        actual_cost_cents: u64,
    ) -> Result<(), SchedulerError> {
        let Some(mut job) = self.jobs.get_mut(&job_id) else {
            return Err(SchedulerError::JobNotFound(job_id.to_string()));
        };
        if job.status.is_terminal() || job.assigned_session != Some(session_id) {
            return Ok(());
        }

        job.status = if success { JobStatus::Completed } else { JobStatus::Failed };
        job.completed_at = Some(self.clock.now());
        job.result = Some(JobResult { success, outputs, error, actual_cost_cents });
        let reservation_id = job.reservation_id;
        drop(job);

        self.registry.remove_current_job(session_id, job_id);

        if let Some(reservation_id) = reservation_id {
            self.accounts.debit(reservation_id, actual_cost_cents).await?;
        }

        self.events.emit(DispatchEvent::JobCompleted(job_id));
        self.wake_waiters(job_id);
        Ok(())
    }

    /// A worker's `job_progress: running` signal. Only meaningful on an
    /// already-assigned job; anything else is ignored.
    pub fn on_progress(&self, session_id: SessionId, job_id: JobId) {
        if let Some(mut job) = self.jobs.get_mut(&job_id) {
            if job.assigned_session == Some(session_id) && job.status == JobStatus::Assigned {
                job.status = JobStatus::Running;
            }
        }
    }

    fn requeue_or_fail(&self, job: &mut Job, reason: FailureReason) -> bool {
        job.attempts += 1;
        job.assigned_session = None;
        job.assigned_at = None;
        if job.attempts < self.config.max_attempts {
            job.status = JobStatus::Pending;
            true
        } else {
            job.status = JobStatus::Failed;
            job.completed_at = Some(self.clock.now());
            job.result = Some(JobResult { success: false, outputs: None, error: Some(reason.as_str().into()), actual_cost_cents: 0 });
            false
        }
    }

    async fn settle_unretryable(&self, job_id: JobId, reservation_id: Option<ReservationId>) {
        if let Some(reservation_id) = reservation_id {
            let _ = self.accounts.refund(reservation_id).await;
        }
        self.wake_waiters(job_id);
    }

    /// Requeues jobs whose worker session just died (from `NodeRegistry::sweep`).
    pub async fn requeue_lost(&self, job_ids: Vec<JobId>) {
        for job_id in job_ids {
            let Some(mut job) = self.jobs.get_mut(&job_id) else { continue };
            if job.status.is_terminal() {
                continue;
            }
            let requeued = self.requeue_or_fail(&mut job, FailureReason::WorkerLost);
            let reservation_id = job.reservation_id;
            drop(job);
            if requeued {
                self.pending.lock().await.push_back(job_id);
            } else {
                self.settle_unretryable(job_id, reservation_id).await;
            }
        }
    }

    /// Enforces per-job timeouts and drives one pass of reserve-and-assign
    /// over the pending FIFO. Intended to be called by the Dispatcher on
    /// every wake.
    pub async fn tick(&self) {
        self.enforce_timeouts().await;
        self.assign_pending().await;
    }

    async fn enforce_timeouts(&self) {
        let now = self.clock.now();
        let mut timed_out = Vec::new();
        for entry in self.jobs.iter() {
            let job = entry.value();
            let active = matches!(job.status, JobStatus::Assigned | JobStatus::Running);
            if !active {
                continue;
            }
            let Some(assigned_at) = job.assigned_at else { continue };
            let elapsed = (now - assigned_at).to_std().unwrap_or(Duration::ZERO);
            if elapsed > Duration::from_secs(job.timeout_seconds) {
                timed_out.push(job.job_id);
            }
        }

        for job_id in timed_out {
            let Some(mut job) = self.jobs.get_mut(&job_id) else { continue };
            let session_id = job.assigned_session;
            if let Some(session_id) = session_id {
                self.registry.remove_current_job(session_id, job_id);
                let _ = self.connections.send(session_id, Outbound::JobCancelled { job_id });
            }
            let requeued = self.requeue_or_fail(&mut job, FailureReason::TimedOut);
            let reservation_id = job.reservation_id;
            drop(job);
            if requeued {
                self.pending.lock().await.push_back(job_id);
            } else {
                self.settle_unretryable(job_id, reservation_id).await;
            }
        }
    }

    /// Walks the pending FIFO oldest-first so that, within a client's
    /// workspace, an earlier job is always considered — and therefore
    /// assigned — before a later one (spec.md property: per-client FIFO).
    /// A worker is assigned to at most one job per tick.
    async fn assign_pending(&self) {
        let mut pending = self.pending.lock().await;
        let mut still_pending = VecDeque::with_capacity(pending.len());
        let mut claimed_sessions: HashSet<SessionId> = HashSet::new();

        while let Some(job_id) = pending.pop_front() {
            let Some(job) = self.jobs.get(&job_id) else { continue };
            if job.status != JobStatus::Pending {
                continue;
            }
            let requirements = job.requirements.clone();
            drop(job);

            let candidate = self
                .registry
                .eligible(&requirements)
                .into_iter()
                .find(|session| !claimed_sessions.contains(&session.session_id));

            match candidate {
                Some(session) => {
                    claimed_sessions.insert(session.session_id);
                    if self.try_assign(job_id, session.session_id).await {
                        continue;
                    }
                    still_pending.push_back(job_id);
                }
                None => still_pending.push_back(job_id),
            }
        }

        *pending = still_pending;
    }

    /// Reserve-then-send: the job is marked `reserved` before the send so a
    /// concurrent tick can't double-assign it, then `assigned` only once the
    /// send succeeds. A send failure rolls the reservation back to pending
    /// rather than leaving the job stranded in `reserved`.
    async fn try_assign(&self, job_id: JobId, session_id: SessionId) -> bool {
        {
            let Some(mut job) = self.jobs.get_mut(&job_id) else { return false };
            if job.status != JobStatus::Pending {
                return false;
            }
            job.status = JobStatus::Reserved;
        }

        // Forward the whole payload wholesale (module_version, credentials and
        // inputs included) — the scheduler treats it as opaque, the worker
        // unpacks it.
        let payload = {
            let job = self.jobs.get(&job_id).unwrap();
            serde_json::to_value(&job.payload).expect("JobPayload always serializes")
        };
        let workspace_id = self.jobs.get(&job_id).unwrap().workspace_id;

        let assignment = Outbound::JobAssignment {
            job: JobAssignmentPayload { id: job_id, job_type: "module-execution".to_string(), payload, workspace_id },
        };

        match self.connections.send(session_id, assignment) {
            Ok(()) => {
                let mut job = self.jobs.get_mut(&job_id).unwrap();
                job.status = JobStatus::Assigned;
                job.assigned_session = Some(session_id);
                job.assigned_at = Some(self.clock.now());
                drop(job);
                self.registry.add_current_job(session_id, job_id);
                true
            }
            Err(_) => {
                let mut job = self.jobs.get_mut(&job_id).unwrap();
                job.status = JobStatus::Pending;
                false
            }
        }
    }
}
