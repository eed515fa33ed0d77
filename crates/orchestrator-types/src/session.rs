//! Worker session state, as tracked by the Node Registry.

use crate::capability::{CapabilityRecord, ResourceLimits};
use crate::ids::{JobId, NodeId, SessionId, ShareKey, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liveness {
    Fresh,
    Stale,
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSession {
    pub session_id: SessionId,
    pub node_id: NodeId,
    pub capability: CapabilityRecord,
    /// Empty set means a public worker, eligible for any workspace affinity.
    pub workspace_bindings: HashSet<WorkspaceId>,
    pub share_key: ShareKey,
    pub share_key_consumed: bool,
    pub liveness: Liveness,
    pub last_heartbeat: DateTime<Utc>,
    pub current_jobs: HashSet<JobId>,
    pub resource_limits: ResourceLimits,
    pub remote_control_enabled: bool,
    pub registered_at: DateTime<Utc>,
}

impl WorkerSession {
    pub fn is_public(&self) -> bool {
        self.workspace_bindings.is_empty()
    }

    pub fn satisfies_affinity(&self, workspace: Option<WorkspaceId>) -> bool {
        match workspace {
            None => true,
            Some(ws) => self.is_public() || self.workspace_bindings.contains(&ws),
        }
    }
}
