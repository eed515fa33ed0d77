//! Flow Deployment Engine (spec.md §4.6): validates a submitted flow as a
//! DAG, then runs one coordinator task per deployment that submits each
//! node's job the moment its predecessors resolve, honoring edge conditions
//! and cascading skips downstream of a failure — all without polling.

use crate::deployment_registry::DeploymentRegistry;
use crate::queue::{JobQueue, SubmitRequest};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use orchestrator_protocol::ModuleRequirementsTable;
use orchestrator_types::{
    evaluate_condition, Clock, ClientId, Deployment, DeploymentId, DeploymentStatus, FlowConnection, FlowNode,
    FlowNodeId, JobId, JobPayload, JobRequirements, NodeRunStatus, NodeStatusEntry, SchedulerError,
    WorkspaceId,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_NODE_JOB_TIMEOUT_SECS: u64 = 300;

pub struct DeploymentRequest {
    pub flow_id: String,
    pub name: String,
    pub client_id: ClientId,
    pub workspace_id: Option<WorkspaceId>,
    pub nodes: Vec<FlowNode>,
    pub connections: Vec<FlowConnection>,
    /// Validate only: never inserted into the registry, never runs.
    pub dry_run: bool,
    /// Keyed by credential id, per `CredentialRef.credential_id`. Held only
    /// in the coordinator's in-memory table, never written to the
    /// `Deployment` record — it's not something an API reader should see.
    pub resolved_credentials: HashMap<String, Value>,
}

pub struct FlowEngine {
    registry: Arc<DeploymentRegistry>,
    queue: Arc<JobQueue>,
    clock: Arc<dyn Clock>,
    module_requirements: ModuleRequirementsTable,
    cancellation_tokens: dashmap::DashMap<DeploymentId, CancellationToken>,
    resolved_credentials: dashmap::DashMap<DeploymentId, HashMap<String, Value>>,
}

impl FlowEngine {
    pub fn new(
        registry: Arc<DeploymentRegistry>,
        queue: Arc<JobQueue>,
        clock: Arc<dyn Clock>,
        module_requirements: ModuleRequirementsTable,
    ) -> Self {
        Self {
            registry,
            queue,
            clock,
            module_requirements,
            cancellation_tokens: dashmap::DashMap::new(),
            resolved_credentials: dashmap::DashMap::new(),
        }
    }

    /// Validates the flow's DAG and — unless `dry_run` — registers it and
    /// spawns its coordinator. Returns `CycleDetected` for a non-DAG graph.
    pub fn submit(self: &Arc<Self>, request: DeploymentRequest) -> Result<DeploymentId, SchedulerError> {
        topological_order(&request.nodes, &request.connections)?;

        if request.dry_run {
            return Ok(DeploymentId::new());
        }

        let now = self.clock.now();
        let deployment_id = DeploymentId::new();
        let node_status: HashMap<FlowNodeId, NodeStatusEntry> = request
            .nodes
            .iter()
            .map(|n| (n.node_id.clone(), NodeStatusEntry { status: Some(NodeRunStatus::Pending), ..Default::default() }))
            .collect();

        let deployment = Deployment {
            deployment_id,
            flow_id: request.flow_id,
            name: request.name,
            client_id: request.client_id,
            workspace_id: request.workspace_id,
            nodes: request.nodes,
            connections: request.connections,
            status: DeploymentStatus::Pending,
            node_status,
            node_jobs: HashMap::new(),
            total_cost_cents: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
        };

        self.registry.insert(deployment);
        self.resolved_credentials.insert(deployment_id, request.resolved_credentials);

        let token = CancellationToken::new();
        self.cancellation_tokens.insert(deployment_id, token.clone());

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(deployment_id, token).await;
        });

        Ok(deployment_id)
    }

    /// Requests cooperative cancellation of a running deployment's
    /// coordinator. Returns `false` if no such deployment is running.
    pub fn cancel(&self, deployment_id: DeploymentId) -> bool {
        match self.cancellation_tokens.get(&deployment_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Marks a node `Failed` and, the first time any node in this deployment
    /// fails, stamps the deployment-level `error` with that node's message
    /// (spec.md §4.6 step 4: "mark deployment failed with the first error").
    fn fail_node(&self, deployment_id: DeploymentId, node_id: &FlowNodeId, error: String) {
        self.registry.update(deployment_id, |d| {
            let entry = d.node_status.entry(node_id.clone()).or_default();
            entry.status = Some(NodeRunStatus::Failed);
            entry.error = Some(error.clone());
            entry.completed_at = Some(self.clock.now());
            if d.error.is_none() {
                d.error = Some(format!("node {node_id} failed: {error}"));
            }
            d.updated_at = self.clock.now();
        });
    }

    fn requirements_for(&self, module_id: &str) -> JobRequirements {
        self.module_requirements
            .get(module_id)
            .or_else(|| self.module_requirements.get(orchestrator_protocol::DEFAULT_MODULE_KEY))
            .cloned()
            .unwrap_or_default()
    }

    async fn run(self: Arc<Self>, deployment_id: DeploymentId, token: CancellationToken) {
        self.registry.update(deployment_id, |d| {
            d.status = DeploymentStatus::Deploying;
            d.updated_at = self.clock.now();
        });

        let mut outstanding: FuturesUnordered<_> = FuturesUnordered::new();

        loop {
            let progressed = self.advance_frontier(deployment_id, &mut outstanding).await;

            let done = self
                .registry
                .get(deployment_id)
                .map(|d| d.node_status.values().all(|s| s.status.map(|st| st != NodeRunStatus::Pending && st != NodeRunStatus::Running).unwrap_or(false)))
                .unwrap_or(true);

            if done {
                break;
            }
            if !progressed && outstanding.is_empty() {
                // No runnable node and nothing in flight: the graph can't
                // make further progress (shouldn't happen for a validated DAG).
                break;
            }

            tokio::select! {
                _ = token.cancelled() => {
                    self.handle_cancellation(deployment_id).await;
                    return;
                }
                next = outstanding.next(), if !outstanding.is_empty() => {
                    if let Some((node_id, job_id)) = next {
                        self.settle_node(deployment_id, &node_id, job_id).await;
                    }
                }
            }
        }

        // Failure can also come from a node that never reached the queue
        // (submission error, missing credential) rather than from
        // `settle_node`, so the deployment-failed flag is derived from the
        // recorded node statuses rather than tracked separately.
        let failed = self
            .registry
            .get(deployment_id)
            .map(|d| d.node_status.values().any(|s| s.status == Some(NodeRunStatus::Failed)))
            .unwrap_or(false);
        self.finalize(deployment_id, failed).await;
        self.cancellation_tokens.remove(&deployment_id);
    }

    /// Submits a job for every node whose predecessors have all resolved and
    /// at least one satisfied edge condition (or the node has none), and
    /// marks `skipped` any node whose predecessors all resolved without a
    /// single satisfied edge. Returns whether any node changed state.
    async fn advance_frontier(&self, deployment_id: DeploymentId, outstanding: &mut FuturesUnordered<impl_future::NodeWait>) -> bool {
        let Some(deployment) = self.registry.get(deployment_id) else { return false };
        let mut progressed = false;

        for node in &deployment.nodes {
            let is_pending = deployment.node_status.get(&node.node_id).and_then(|s| s.status) == Some(NodeRunStatus::Pending);
            if !is_pending {
                continue;
            }

            match ready_state(&deployment, &node.node_id) {
                ReadyState::Waiting => continue,
                ReadyState::Skip => {
                    self.registry.update(deployment_id, |d| {
                        let entry = d.node_status.entry(node.node_id.clone()).or_default();
                        entry.status = Some(NodeRunStatus::Skipped);
                        entry.completed_at = Some(self.clock.now());
                        d.updated_at = self.clock.now();
                    });
                    progressed = true;
                }
                ReadyState::Run => {
                    let requirements = self.requirements_for(&node.module_id);
                    let inputs = self.collect_inputs(&deployment, &node.node_id);
                    let credentials = match self.select_credentials(deployment_id, node) {
                        Ok(credentials) => credentials,
                        Err(err) => {
                            self.fail_node(deployment_id, &node.node_id, err.to_string());
                            progressed = true;
                            continue;
                        }
                    };
                    let payload = JobPayload::ModuleExecution {
                        module_id: node.module_id.clone(),
                        module_version: node.module_version.clone(),
                        config: node.config.clone(),
                        credentials,
                        inputs,
                    };

                    let job_id = match self
                        .queue
                        .submit(SubmitRequest {
                            client_id: deployment.client_id,
                            account_id: None,
                            workspace_id: deployment.workspace_id,
                            requirements,
                            payload,
                            timeout_seconds: DEFAULT_NODE_JOB_TIMEOUT_SECS,
                            deployment_ref: Some((deployment_id, node.node_id.clone())),
                        })
                        .await
                    {
                        Ok(job_id) => job_id,
                        Err(err) => {
                            self.fail_node(deployment_id, &node.node_id, err.to_string());
                            progressed = true;
                            continue;
                        }
                    };

                    self.registry.update(deployment_id, |d| {
                        let entry = d.node_status.entry(node.node_id.clone()).or_default();
                        entry.status = Some(NodeRunStatus::Running);
                        entry.job_id = Some(job_id);
                        entry.started_at = Some(self.clock.now());
                        d.node_jobs.insert(node.node_id.clone(), job_id);
                        d.updated_at = self.clock.now();
                    });

                    let node_id = node.node_id.clone();
                    let waiter = self.queue.subscribe(job_id);
                    outstanding.push(impl_future::wait_for(node_id, job_id, waiter));
                    progressed = true;
                }
            }
        }

        progressed
    }

    /// Selects each node credential ref out of this deployment's
    /// resolved-credentials table (spec.md §4.6 step 3). Fails with
    /// `CredentialMissing` the moment a ref can't be resolved.
    fn select_credentials(&self, deployment_id: DeploymentId, node: &FlowNode) -> Result<HashMap<String, Value>, SchedulerError> {
        if node.credential_refs.is_empty() {
            return Ok(HashMap::new());
        }
        let resolved = self.resolved_credentials.get(&deployment_id);
        let mut credentials = HashMap::with_capacity(node.credential_refs.len());
        for (logical_key, credential_ref) in &node.credential_refs {
            let value = resolved
                .as_ref()
                .and_then(|map| map.get(&credential_ref.credential_id))
                .ok_or_else(|| SchedulerError::CredentialMissing(credential_ref.credential_id.clone()))?;
            credentials.insert(logical_key.clone(), value.clone());
        }
        Ok(credentials)
    }

    fn collect_inputs(&self, deployment: &Deployment, node_id: &FlowNodeId) -> HashMap<String, Value> {
        let mut inputs = HashMap::new();
        for conn in deployment.predecessors_of(node_id) {
            if let Some(entry) = deployment.node_status.get(&conn.source_node_id) {
                if entry.status == Some(NodeRunStatus::Completed) {
                    if let Some(output) = &entry.output {
                        inputs.insert(conn.target_port.clone(), output.clone());
                    }
                }
            }
        }
        inputs
    }

    /// Records a completed node's job outcome.
    async fn settle_node(&self, deployment_id: DeploymentId, node_id: &FlowNodeId, job_id: JobId) {
        let Some(job) = self.queue.get(job_id) else { return };
        let success = job.result.as_ref().map(|r| r.success).unwrap_or(false);
        let output = job.result.as_ref().and_then(|r| r.outputs.clone());
        let error = job.result.as_ref().and_then(|r| r.error.clone());

        self.registry.update(deployment_id, |d| {
            let entry = d.node_status.entry(node_id.clone()).or_default();
            entry.status = Some(if success { NodeRunStatus::Completed } else { NodeRunStatus::Failed });
            entry.output = output;
            entry.error = error.clone();
            entry.completed_at = Some(self.clock.now());
            if !success && d.error.is_none() {
                d.error = Some(format!("node {node_id} failed: {}", error.as_deref().unwrap_or("job failed")));
            }
            d.total_cost_cents += job.result.as_ref().map(|r| r.actual_cost_cents).unwrap_or(0);
            d.updated_at = self.clock.now();
        });
    }

    async fn handle_cancellation(&self, deployment_id: DeploymentId) {
        if let Some(deployment) = self.registry.get(deployment_id) {
            for (node_id, job_id) in deployment.node_jobs.iter() {
                if deployment.node_status.get(node_id).and_then(|s| s.status) == Some(NodeRunStatus::Running) {
                    self.queue.cancel(*job_id).await;
                }
            }
        }

        self.registry.update(deployment_id, |d| {
            for entry in d.node_status.values_mut() {
                if matches!(entry.status, Some(NodeRunStatus::Pending) | Some(NodeRunStatus::Running)) {
                    entry.status = Some(NodeRunStatus::Skipped);
                }
            }
            d.status = DeploymentStatus::Cancelled;
            d.completed_at = Some(self.clock.now());
            d.updated_at = self.clock.now();
        });
        self.cancellation_tokens.remove(&deployment_id);
        self.resolved_credentials.remove(&deployment_id);
    }

    async fn finalize(&self, deployment_id: DeploymentId, failed: bool) {
        self.registry.update(deployment_id, |d| {
            if d.status == DeploymentStatus::Cancelled {
                return;
            }
            d.status = if failed { DeploymentStatus::Failed } else { DeploymentStatus::Completed };
            d.completed_at = Some(self.clock.now());
            d.updated_at = self.clock.now();
        });
        self.resolved_credentials.remove(&deployment_id);
    }
}

enum ReadyState {
    Waiting,
    Run,
    Skip,
}

/// A node is ready to run once every predecessor has resolved and at least
/// one incoming edge is satisfied (no condition, or condition true against
/// that predecessor's output); it's skipped if all predecessors resolved but
/// none satisfied. A source node (no predecessors) is always ready.
fn ready_state(deployment: &Deployment, node_id: &FlowNodeId) -> ReadyState {
    let predecessors = deployment.predecessors_of(node_id);
    if predecessors.is_empty() {
        return ReadyState::Run;
    }

    let mut any_satisfied = false;
    for conn in predecessors {
        let status = deployment.node_status.get(&conn.source_node_id).and_then(|s| s.status);
        match status {
            None | Some(NodeRunStatus::Pending) | Some(NodeRunStatus::Running) => return ReadyState::Waiting,
            Some(NodeRunStatus::Skipped) | Some(NodeRunStatus::Failed) => continue,
            Some(NodeRunStatus::Completed) => {
                let satisfied = match &conn.condition {
                    None => true,
                    Some(cond) => {
                        let output = deployment
                            .node_status
                            .get(&conn.source_node_id)
                            .and_then(|s| s.output.clone())
                            .unwrap_or(Value::Null);
                        evaluate_condition(cond, &output)
                    }
                };
                any_satisfied = any_satisfied || satisfied;
            }
        }
    }

    if any_satisfied { ReadyState::Run } else { ReadyState::Skip }
}

/// Kahn's algorithm: returns the topological order, or `CycleDetected` if
/// the graph has one. Also rejects dangling connection endpoints.
fn topological_order(nodes: &[FlowNode], connections: &[FlowConnection]) -> Result<Vec<FlowNodeId>, SchedulerError> {
    let ids: HashSet<&FlowNodeId> = nodes.iter().map(|n| &n.node_id).collect();
    for conn in connections {
        if !ids.contains(&conn.source_node_id) || !ids.contains(&conn.target_node_id) {
            return Err(SchedulerError::ProtocolViolation(format!(
                "connection references unknown node: {} -> {}",
                conn.source_node_id, conn.target_node_id
            )));
        }
    }

    let mut in_degree: HashMap<FlowNodeId, usize> = nodes.iter().map(|n| (n.node_id.clone(), 0)).collect();
    let mut adjacency: HashMap<FlowNodeId, Vec<FlowNodeId>> = HashMap::new();
    for conn in connections {
        *in_degree.get_mut(&conn.target_node_id).unwrap() += 1;
        adjacency.entry(conn.source_node_id.clone()).or_default().push(conn.target_node_id.clone());
    }

    let mut queue: VecDeque<FlowNodeId> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| id.clone()).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(node_id) = queue.pop_front() {
        order.push(node_id.clone());
        if let Some(successors) = adjacency.get(&node_id) {
            for succ in successors {
                let degree = in_degree.get_mut(succ).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(succ.clone());
                }
            }
        }
    }

    if order.len() != nodes.len() {
        return Err(SchedulerError::CycleDetected);
    }

    Ok(order)
}

/// A tiny wrapper module so `FuturesUnordered` can hold a concrete,
/// nameable future type without boxing.
mod impl_future {
    use orchestrator_types::{FlowNodeId, JobId};
    use tokio::sync::oneshot;

    pub type NodeWait = std::pin::Pin<Box<dyn std::future::Future<Output = (FlowNodeId, JobId)> + Send>>;

    pub fn wait_for(node_id: FlowNodeId, job_id: JobId, waiter: oneshot::Receiver<()>) -> NodeWait {
        Box::pin(async move {
            let _ = waiter.await;
            (node_id, job_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{AccountsGateway, InMemoryAccountsGateway};
    use crate::events::EventSink;
    use crate::registry::NodeRegistry;
    use crate::session_transport::WorkerConnections;
    use chrono::Utc;
    use orchestrator_types::{
        CapabilityRecord, ConditionOp, CpuInfo, EdgeCondition, FixedClock, JobStatus, MemoryInfo, NodeId, StorageInfo,
    };
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn cap() -> CapabilityRecord {
        CapabilityRecord {
            cpu: CpuInfo { model: "x".into(), cores: 4, threads: 4, features: vec![] },
            memory: MemoryInfo { total_mb: 8192, available_mb: 8192 },
            storage: StorageInfo { total_gb: 10, available_gb: 10 },
            gpus: vec![],
            adapters: ["docker".to_string()].into_iter().collect(),
        }
    }

    fn node(id: &str) -> FlowNode {
        FlowNode {
            node_id: FlowNodeId(id.into()),
            module_id: "noop".into(),
            module_version: "1".into(),
            position: json!({}),
            config: json!({}),
            credential_refs: HashMap::new(),
        }
    }

    fn conn(from: &str, to: &str) -> FlowConnection {
        FlowConnection {
            source_node_id: FlowNodeId(from.into()),
            source_port: "output".into(),
            target_node_id: FlowNodeId(to.into()),
            target_port: "input".into(),
            transform: None,
            condition: None,
        }
    }

    #[test]
    fn topological_order_detects_cycle() {
        let nodes = vec![node("a"), node("b")];
        let connections = vec![conn("a", "b"), conn("b", "a")];
        let err = topological_order(&nodes, &connections).unwrap_err();
        assert!(matches!(err, SchedulerError::CycleDetected));
    }

    #[test]
    fn topological_order_accepts_dag() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let connections = vec![conn("a", "b"), conn("b", "c")];
        let order = topological_order(&nodes, &connections).unwrap();
        assert_eq!(order, vec![FlowNodeId("a".into()), FlowNodeId("b".into()), FlowNodeId("c".into())]);
    }

    async fn run_to_completion(engine: Arc<FlowEngine>, queue: Arc<JobQueue>, registry: Arc<NodeRegistry>, deployment_id: DeploymentId) -> Deployment {
        for _ in 0..50 {
            queue.tick().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
            if let Some(d) = engine_registry(&engine).get(deployment_id) {
                if d.status != DeploymentStatus::Pending && d.status != DeploymentStatus::Deploying && d.status != DeploymentStatus::Running {
                    return d;
                }
            }
        }
        let _ = registry.stats();
        engine_registry(&engine).get(deployment_id).unwrap()
    }

    fn engine_registry(engine: &Arc<FlowEngine>) -> Arc<DeploymentRegistry> {
        engine.registry.clone()
    }

    #[tokio::test]
    async fn deployment_with_failed_root_skips_downstream() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let node_registry = Arc::new(NodeRegistry::new(clock.clone(), EventSink::discard()));
        let connections_registry = Arc::new(WorkerConnections::new());
        let accounts: Arc<dyn AccountsGateway> = Arc::new(InMemoryAccountsGateway::unlimited());
        let queue = Arc::new(JobQueue::new(node_registry.clone(), connections_registry.clone(), accounts, clock.clone(), EventSink::discard()));

        let outcome = node_registry.register(NodeId("w1".into()), cap(), vec![], None, None).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        connections_registry.attach(outcome.session_id, tx);

        let deployment_registry = Arc::new(DeploymentRegistry::new());
        let engine = Arc::new(FlowEngine::new(deployment_registry.clone(), queue.clone(), clock.clone(), HashMap::new()));

        let deployment_id = engine
            .submit(DeploymentRequest {
                flow_id: "f1".into(),
                name: "test".into(),
                client_id: ClientId::new(),
                workspace_id: None,
                nodes: vec![node("a"), node("b")],
                connections: vec![conn("a", "b")],
                dry_run: false,
                resolved_credentials: HashMap::new(),
            })
            .unwrap();

        // Drive the coordinator: wait for node "a"'s job to actually reach the
        // worker (not just appear in `node_jobs`, which is populated at submit
        // time, before reserve-and-assign runs), then fail it.
        let mut job_id = None;
        for _ in 0..50 {
            queue.tick().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
            if let Some(d) = deployment_registry.get(deployment_id) {
                if let Some(j) = d.node_jobs.get(&FlowNodeId("a".into())) {
                    if queue.get(*j).map(|job| job.status == JobStatus::Assigned).unwrap_or(false) {
                        job_id = Some(*j);
                        break;
                    }
                }
            }
        }
        let job_id = job_id.expect("node a's job should have been assigned to the worker");
        let _ = rx.try_recv();
        queue.on_result(outcome.session_id, job_id, false, None, Some("boom".into()), 0).await.unwrap();

        let deployment = run_to_completion(engine, queue, node_registry, deployment_id).await;
        assert_eq!(deployment.status, DeploymentStatus::Failed);
        assert_eq!(deployment.node_status[&FlowNodeId("a".into())].status, Some(NodeRunStatus::Failed));
        assert_eq!(deployment.node_status[&FlowNodeId("b".into())].status, Some(NodeRunStatus::Skipped));
        let error = deployment.error.expect("deployment-level error should be set on failure");
        assert!(error.contains("boom"), "expected the first node's error in the deployment error, got: {error}");
    }

    #[tokio::test]
    async fn missing_credential_ref_fails_node_and_sets_deployment_error() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let node_registry = Arc::new(NodeRegistry::new(clock.clone(), EventSink::discard()));
        let connections_registry = Arc::new(WorkerConnections::new());
        let accounts: Arc<dyn AccountsGateway> = Arc::new(InMemoryAccountsGateway::unlimited());
        let queue = Arc::new(JobQueue::new(node_registry.clone(), connections_registry.clone(), accounts, clock.clone(), EventSink::discard()));

        let outcome = node_registry.register(NodeId("w1".into()), cap(), vec![], None, None).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        connections_registry.attach(outcome.session_id, tx);

        let deployment_registry = Arc::new(DeploymentRegistry::new());
        let engine = Arc::new(FlowEngine::new(deployment_registry.clone(), queue.clone(), clock.clone(), HashMap::new()));

        let mut needs_cred = node("a");
        needs_cred.credential_refs.insert(
            "api".into(),
            orchestrator_types::CredentialRef { credential_id: "cred-1".into(), credential_type: "bearer".into() },
        );

        let deployment_id = engine
            .submit(DeploymentRequest {
                flow_id: "f1".into(),
                name: "test".into(),
                client_id: ClientId::new(),
                workspace_id: None,
                nodes: vec![needs_cred],
                connections: vec![],
                dry_run: false,
                resolved_credentials: HashMap::new(),
            })
            .unwrap();

        let deployment = run_to_completion(engine, queue, node_registry, deployment_id).await;
        assert_eq!(deployment.status, DeploymentStatus::Failed);
        assert_eq!(deployment.node_status[&FlowNodeId("a".into())].status, Some(NodeRunStatus::Failed));
        let error = deployment.error.expect("deployment-level error should be set");
        assert!(error.contains("cred-1"), "expected the missing credential id in the error, got: {error}");
    }

    #[test]
    fn ready_state_honors_edge_condition() {
        let mut node_status = HashMap::new();
        node_status.insert(
            FlowNodeId("a".into()),
            NodeStatusEntry { status: Some(NodeRunStatus::Completed), output: Some(json!({"go": false})), ..Default::default() },
        );
        node_status.insert(FlowNodeId("b".into()), NodeStatusEntry { status: Some(NodeRunStatus::Pending), ..Default::default() });

        let deployment = Deployment {
            deployment_id: DeploymentId::new(),
            flow_id: "f".into(),
            name: "n".into(),
            client_id: ClientId::new(),
            workspace_id: None,
            nodes: vec![node("a"), node("b")],
            connections: vec![FlowConnection {
                source_node_id: FlowNodeId("a".into()),
                source_port: "output".into(),
                target_node_id: FlowNodeId("b".into()),
                target_port: "input".into(),
                transform: None,
                condition: Some(EdgeCondition { field: "go".into(), op: ConditionOp::Eq, value: json!(true) }),
            }],
            status: DeploymentStatus::Running,
            node_status,
            node_jobs: HashMap::new(),
            total_cost_cents: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
            error: None,
        };

        assert!(matches!(ready_state(&deployment, &FlowNodeId("b".into())), ReadyState::Skip));
    }
}
