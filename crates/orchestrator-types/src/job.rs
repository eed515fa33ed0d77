//! Job requirements, payload, lifecycle, and result types owned by the Job
//! Queue.

use crate::ids::{AccountId, ClientId, DeploymentId, FlowNodeId, JobId, SessionId, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequirements {
    pub cpu: CpuRequirement,
    pub memory: MemoryRequirement,
    pub gpu: Option<GpuRequirement>,
    /// The single adapter a worker must expose to run this job.
    pub adapter: String,
    pub max_cost_cents: u64,
    pub currency: String,
    pub affinity: Option<WorkspaceId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuRequirement {
    pub min_cores: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryRequirement {
    pub min_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuRequirement {
    pub count: u32,
    pub min_vram_mb: u64,
    pub requires: std::collections::HashSet<crate::capability::ComputeApi>,
}

/// Opaque-to-the-scheduler job payload. Tagged so future job kinds can be
/// added without touching the Capability Matcher or Job Queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JobPayload {
    #[serde(rename = "module-execution")]
    ModuleExecution {
        module_id: String,
        module_version: String,
        config: serde_json::Value,
        credentials: HashMap<String, serde_json::Value>,
        inputs: HashMap<String, serde_json::Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Reserved,
    Assigned,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    pub outputs: Option<serde_json::Value>,
    pub error: Option<String>,
    pub actual_cost_cents: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub client_id: ClientId,
    pub account_id: Option<AccountId>,
    pub workspace_id: Option<WorkspaceId>,
    pub requirements: JobRequirements,
    pub payload: JobPayload,
    pub timeout_seconds: u64,
    pub status: JobStatus,
    pub assigned_session: Option<SessionId>,
    pub enqueued_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub result: Option<JobResult>,
    pub reservation_id: Option<crate::ids::ReservationId>,
    /// Weak reference back to the owning deployment/flow-node, if any.
    pub deployment_ref: Option<(DeploymentId, FlowNodeId)>,
}

impl Job {
    pub fn belongs_to_deployment(&self, deployment_id: DeploymentId) -> bool {
        self.deployment_ref
            .as_ref()
            .map(|(d, _)| *d == deployment_id)
            .unwrap_or(false)
    }
}
