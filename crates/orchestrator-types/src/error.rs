//! Error kinds observable to API callers (spec.md §7). Internal-only
//! failures (`WorkerLost`, `TimedOut`) are surfaced here too since both the
//! HTTP edge and deployment coordinators need to match on them.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SchedulerError {
    #[error("flow contains a cycle")]
    CycleDetected,

    #[error("no worker can satisfy the job's requirements")]
    CapabilityUnsatisfiable,

    #[error("insufficient account funds for reservation")]
    InsufficientFunds,

    #[error("worker lost: session went dead while job was in flight")]
    WorkerLost,

    #[error("job timed out after {0}s")]
    TimedOut(u64),

    #[error("worker reported failure: {0}")]
    WorkerError(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("result referenced an unknown or unassigned job")]
    UnknownJob,

    #[error("required credential missing: {0}")]
    CredentialMissing(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("deployment not found: {0}")]
    DeploymentNotFound(String),

    #[error("share key not found or already consumed")]
    ShareKeyNotFound,

    #[error("accounts gateway rejected the request: {0}")]
    AccountsError(String),
}
