//! Deployment Registry (spec.md §4.7): an in-memory store of deployments
//! plus a client-id index. All mutation goes through the Flow Deployment
//! Engine's coordinator — this type has no public path to mutate a
//! deployment except through `update`, which the engine alone calls.

use dashmap::DashMap;
use orchestrator_types::{ClientId, Deployment, DeploymentId, DeploymentStatus};
use std::collections::HashSet;

#[derive(Default)]
pub struct DeploymentRegistry {
    deployments: DashMap<DeploymentId, Deployment>,
    by_client: DashMap<ClientId, HashSet<DeploymentId>>,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct DeploymentStats {
    pub pending: u64,
    pub deploying: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, deployment: Deployment) {
        let deployment_id = deployment.deployment_id;
        let client_id = deployment.client_id;
        self.deployments.insert(deployment_id, deployment);
        self.by_client.entry(client_id).or_default().insert(deployment_id);
    }

    pub fn get(&self, deployment_id: DeploymentId) -> Option<Deployment> {
        self.deployments.get(&deployment_id).map(|e| e.value().clone())
    }

    pub fn list_for_client(&self, client_id: ClientId) -> Vec<Deployment> {
        let Some(ids) = self.by_client.get(&client_id) else { return Vec::new() };
        ids.iter().filter_map(|id| self.get(*id)).collect()
    }

    /// The Flow Deployment Engine's coordinator is the only caller; it holds
    /// the only mutable view into a running deployment's node status.
    pub fn update<R>(&self, deployment_id: DeploymentId, f: impl FnOnce(&mut Deployment) -> R) -> Option<R> {
        self.deployments.get_mut(&deployment_id).map(|mut e| f(e.value_mut()))
    }

    pub fn stats(&self) -> DeploymentStats {
        let mut stats = DeploymentStats::default();
        for entry in self.deployments.iter() {
            match entry.status {
                DeploymentStatus::Pending => stats.pending += 1,
                DeploymentStatus::Deploying => stats.deploying += 1,
                DeploymentStatus::Running => stats.running += 1,
                DeploymentStatus::Completed => stats.completed += 1,
                DeploymentStatus::Failed => stats.failed += 1,
                DeploymentStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}
