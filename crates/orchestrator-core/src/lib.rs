//! Scheduling and execution engine: Node Registry, Job Queue, Flow
//! Deployment Engine, Deployment Registry, Accounts Gateway, and the
//! Dispatcher that serializes them.

pub mod accounts;
pub mod deployment_registry;
pub mod dispatcher;
pub mod events;
pub mod flow_engine;
pub mod matcher;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod session_transport;

pub use accounts::{AccountsGateway, InMemoryAccountsGateway};
pub use deployment_registry::{DeploymentRegistry, DeploymentStats};
pub use dispatcher::Dispatcher;
pub use events::{DispatchEvent, EventSink};
pub use flow_engine::{DeploymentRequest, FlowEngine};
pub use metrics::Metrics;
pub use queue::{JobQueue, QueueConfig, QueueStats, SubmitRequest};
pub use registry::{HeartbeatOutcome, LivenessConfig, NodeRegistry, RegisterOutcome, RegistryStats};
pub use session_transport::{SendError, WorkerConnections};
