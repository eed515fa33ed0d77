//! Deployment state, owned exclusively by the Flow Deployment Engine /
//! Deployment Registry.

use crate::flow::{FlowConnection, FlowNode};
use crate::ids::{ClientId, DeploymentId, FlowNodeId, JobId, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    Pending,
    Deploying,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStatusEntry {
    pub status: Option<NodeRunStatus>,
    pub job_id: Option<JobId>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub output: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub deployment_id: DeploymentId,
    pub flow_id: String,
    pub name: String,
    pub client_id: ClientId,
    pub workspace_id: Option<WorkspaceId>,
    pub nodes: Vec<FlowNode>,
    pub connections: Vec<FlowConnection>,
    pub status: DeploymentStatus,
    pub node_status: HashMap<FlowNodeId, NodeStatusEntry>,
    pub node_jobs: HashMap<FlowNodeId, JobId>,
    pub total_cost_cents: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Deployment {
    pub fn node(&self, id: &FlowNodeId) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| &n.node_id == id)
    }

    /// Node ids reachable from `start` by following connections forward,
    /// i.e. the transitive downstream set used for skip-cascades.
    pub fn downstream_of(&self, start: &FlowNodeId) -> std::collections::HashSet<FlowNodeId> {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![start.clone()];
        while let Some(cur) = stack.pop() {
            for conn in &self.connections {
                if conn.source_node_id == cur && seen.insert(conn.target_node_id.clone()) {
                    stack.push(conn.target_node_id.clone());
                }
            }
        }
        seen
    }

    pub fn predecessors_of(&self, target: &FlowNodeId) -> Vec<&FlowConnection> {
        self.connections
            .iter()
            .filter(|c| &c.target_node_id == target)
            .collect()
    }
}
