//! API Module
//!
//! HTTP API layer for the listener.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod job;
pub mod pagination;
pub mod repository;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    routing::{get, post, put},
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::service::job::{JobOrchestrator, RetryPolicy};
use crate::store::{JobStore, RepositoryStore};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub repositories: Arc<dyn RepositoryStore>,
    pub jobs: Arc<dyn JobStore>,
    pub orchestrator: Arc<JobOrchestrator>,
}

impl AppState {
    pub fn new(
        repositories: Arc<dyn RepositoryStore>,
        jobs: Arc<dyn JobStore>,
        policy: RetryPolicy,
    ) -> Self {
        let orchestrator = Arc::new(JobOrchestrator::new(
            repositories.clone(),
            jobs.clone(),
            policy,
        ));

        Self {
            repositories,
            jobs,
            orchestrator,
        }
    }
}

/// Create the main API router with all endpoints
///
/// Requests running past `request_timeout` are answered with 408 and their
/// handler future is dropped, cancelling any store call in flight.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");

        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    });

    Router::new()
        // Health check
        .route("/heartbeat", get(health::heartbeat))
        // Job endpoints
        .route("/v1/jobs", post(job::process_publish).get(job::list_jobs))
        .route("/v1/jobs/{id}", get(job::get_job).delete(job::delete_job))
        .route("/v1/jobs/{id}/state", put(job::update_job_state))
        // Repository endpoints
        .route(
            "/v1/repositories",
            post(repository::create_repository).get(repository::list_repositories),
        )
        .route(
            "/v1/repositories/{id}",
            get(repository::get_repository)
                .put(repository::update_repository)
                .delete(repository::delete_repository),
        )
        // Add state and middleware; the last layer added runs first
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(CorsLayer::permissive())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(trace)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
