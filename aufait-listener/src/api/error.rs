//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use aufait_core::domain::Job;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::job::{JobError, ProcessError, Stage};
use crate::service::repository::RepositoryError;
use crate::store::StoreError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
    /// Publish processing stopped after validation; `jobs` were committed.
    PartialFailure {
        message: String,
        stage: Stage,
        jobs: Vec<Job>,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::PartialFailure {
                message,
                stage,
                jobs,
            } => {
                tracing::error!(
                    "Publish failed during {} ({} job(s) committed): {}",
                    stage,
                    jobs.len(),
                    message
                );
                let body = serde_json::json!({
                    "error": message,
                    "stage": stage.to_string(),
                    "jobs": jobs,
                });
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            StoreError::Conflict(_) | StoreError::RetriesExhausted { .. } => {
                ApiError::Conflict(err.to_string())
            }
            StoreError::Corrupt(_) | StoreError::Database(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Validation(err) => ApiError::BadRequest(err.to_string()),
            JobError::Transition(err) => ApiError::Conflict(err.to_string()),
            JobError::NotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
            JobError::ExpirationOutOfRange(ttl) => {
                ApiError::Internal(format!("job expiration out of range (ttl {ttl})"))
            }
            JobError::Store(err) => err.into(),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => {
                ApiError::NotFound(format!("Repository {} not found", id))
            }
            RepositoryError::Validation(err) => ApiError::BadRequest(err.to_string()),
            RepositoryError::Store(err) => err.into(),
        }
    }
}

impl From<ProcessError> for ApiError {
    fn from(err: ProcessError) -> Self {
        match err.stage {
            Stage::Validation => err.source.into(),
            Stage::QueryRepositories | Stage::Persist { .. } => ApiError::PartialFailure {
                message: err.source.to_string(),
                stage: err.stage,
                jobs: err.committed,
            },
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
