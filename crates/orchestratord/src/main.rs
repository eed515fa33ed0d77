mod config;
mod error;
mod http;
mod state;
mod ws;

use axum::routing::get;
use axum::Router;
use config::OrchestratorConfig;
use orchestrator_core::{
    Dispatcher, EventSink, FlowEngine, InMemoryAccountsGateway, JobQueue, LivenessConfig, Metrics, NodeRegistry,
    WorkerConnections,
};
use orchestrator_protocol::ModuleRequirementsTable;
use orchestrator_types::SystemClock;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = OrchestratorConfig::from_env();
    tracing::info!(addr = %config.bind_addr, "starting orchestratord");

    let clock = Arc::new(SystemClock);
    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
    let events = EventSink::new(event_tx);

    let registry = Arc::new(NodeRegistry::with_liveness(
        clock.clone(),
        events.clone(),
        LivenessConfig {
            fresh_after: Duration::from_secs(config.fresh_after_secs),
            stale_after: Duration::from_secs(config.stale_after_secs),
        },
    ));
    let connections = Arc::new(WorkerConnections::new());
    let accounts: Arc<dyn orchestrator_core::AccountsGateway> = Arc::new(InMemoryAccountsGateway::unlimited());
    let queue = Arc::new(JobQueue::with_config(
        registry.clone(),
        connections.clone(),
        accounts,
        clock.clone(),
        events.clone(),
        orchestrator_core::QueueConfig { max_attempts: config.job_max_attempts },
    ));
    let deployments = Arc::new(orchestrator_core::DeploymentRegistry::new());
    let module_requirements: ModuleRequirementsTable = ModuleRequirementsTable::new();
    let flow_engine = Arc::new(FlowEngine::new(deployments.clone(), queue.clone(), clock.clone(), module_requirements.clone()));

    let metrics = Metrics::new().expect("metrics registration cannot fail on process boot");

    let dispatcher = Dispatcher::new(registry.clone(), queue.clone(), event_rx).with_metrics(metrics.clone());
    tokio::spawn(dispatcher.run());

    let state = AppState {
        registry,
        connections,
        queue,
        flow_engine,
        deployments,
        module_requirements,
        metrics,
        started_at: std::time::Instant::now(),
    };

    let app = Router::new()
        .route("/ws/node", get(ws::ws_handler))
        .merge(http::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "orchestratord listening");
    axum::serve(listener, app).await?;
    Ok(())
}
