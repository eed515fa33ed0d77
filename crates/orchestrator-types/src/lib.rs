//! Shared data model for the compute orchestrator.
//!
//! Every type a worker connection, the scheduler, and the HTTP edge need to
//! agree on lives here: capability records, session state, job requirements
//! and lifecycle, flow/deployment shapes, and the scheduler's error enum.

pub mod capability;
pub mod clock;
pub mod deployment;
pub mod error;
pub mod flow;
pub mod ids;
pub mod job;
pub mod session;

pub use capability::{CapabilityRecord, ComputeApi, CpuInfo, GpuInfo, GpuVendor, MemoryInfo, ResourceLimits, StorageInfo};
pub use clock::{Clock, FixedClock, SystemClock};
pub use deployment::{Deployment, DeploymentStatus, NodeRunStatus, NodeStatusEntry};
pub use error::SchedulerError;
pub use flow::{evaluate_condition, ConditionOp, CredentialRef, EdgeCondition, FlowConnection, FlowNode};
pub use ids::{
    generate_share_key, AccountId, ClientId, DeploymentId, FlowNodeId, JobId, NodeId, ReservationId,
    SessionId, ShareKey, WorkspaceId,
};
pub use job::{CpuRequirement, GpuRequirement, Job, JobPayload, JobRequirements, JobResult, JobStatus, MemoryRequirement};
pub use session::{Liveness, WorkerSession};
