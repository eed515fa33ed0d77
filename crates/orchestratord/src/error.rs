//! HTTP mapping for `SchedulerError` (spec.md §7). Kept at the edge rather
//! than in `orchestrator-types` so the library crates stay transport-agnostic.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator_types::SchedulerError;

pub struct ApiError(pub SchedulerError);

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SchedulerError::JobNotFound(_) | SchedulerError::SessionNotFound(_) | SchedulerError::DeploymentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            SchedulerError::ShareKeyNotFound | SchedulerError::UnknownJob => StatusCode::NOT_FOUND,
            SchedulerError::CycleDetected
            | SchedulerError::CapabilityUnsatisfiable
            | SchedulerError::CredentialMissing(_)
            | SchedulerError::ProtocolViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SchedulerError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            SchedulerError::WorkerLost | SchedulerError::TimedOut(_) | SchedulerError::WorkerError(_) => {
                StatusCode::BAD_GATEWAY
            }
            SchedulerError::AccountsError(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}
