use orchestrator_core::{DeploymentRegistry, FlowEngine, JobQueue, Metrics, NodeRegistry, WorkerConnections};
use orchestrator_protocol::ModuleRequirementsTable;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<NodeRegistry>,
    pub connections: Arc<WorkerConnections>,
    pub queue: Arc<JobQueue>,
    pub flow_engine: Arc<FlowEngine>,
    pub deployments: Arc<DeploymentRegistry>,
    pub module_requirements: ModuleRequirementsTable,
    pub metrics: Arc<Metrics>,
    pub started_at: Instant,
}
