//! Worker Session wire protocol (spec.md §4.3).
//!
//! Framing is one JSON message per transport frame; every message carries a
//! `type` discriminant via `#[serde(tag = "type")]`. `Inbound` is what a
//! worker sends the orchestrator; `Outbound` is what the orchestrator sends
//! back.

use orchestrator_types::{JobId, NodeId, ResourceLimits, ShareKey, WorkspaceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Register {
        node_id: NodeId,
        capabilities: orchestrator_types::CapabilityRecord,
        #[serde(default)]
        workspace_ids: Vec<WorkspaceId>,
        #[serde(default)]
        share_key: Option<ShareKey>,
        #[serde(default)]
        resource_limits: Option<ResourceLimits>,
    },
    Heartbeat {
        available: bool,
        current_jobs: u32,
    },
    JobResult {
        job_id: JobId,
        status: TerminalJobStatus,
        #[serde(default)]
        result: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        actual_cost_cents: Option<u64>,
        #[serde(default)]
        outputs: Option<serde_json::Value>,
    },
    JobProgress {
        job_id: JobId,
        state: ProgressState,
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalJobStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Running,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAssignmentPayload {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub workspace_id: Option<WorkspaceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Registered {
        node_id: NodeId,
        share_key: ShareKey,
    },
    JobAssignment {
        job: JobAssignmentPayload,
    },
    JobCancelled {
        job_id: JobId,
    },
    UpdateLimits {
        limits: ResourceLimits,
    },
    WorkspacesUpdated {
        workspace_ids: Vec<WorkspaceId>,
    },
    Error {
        message: String,
    },
}

/// Map of module-id to a partial job-requirements override, with a `DEFAULT`
/// fallback entry. Exposed read-only via `GET /module-requirements`.
pub type ModuleRequirementsTable = HashMap<String, orchestrator_types::JobRequirements>;

pub const DEFAULT_MODULE_KEY: &str = "DEFAULT";
