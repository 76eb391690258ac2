//! Job API Handlers
//!
//! Publish hook intake plus job inspection and hand-off endpoints.

use aufait_core::domain::{Job, PublishEvent};
use aufait_core::dto::job::UpdateJobState;
use aufait_core::dto::publish::PublishHook;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::api::pagination::{PageQuery, PaginatedList};
use crate::service::job_service;

/// POST /v1/jobs
/// Fold a publish hook into the jobs of every affected repository
pub async fn process_publish(
    State(state): State<AppState>,
    Json(hook): Json<PublishHook>,
) -> ApiResult<Json<Vec<Job>>> {
    let event = PublishEvent::from(hook);
    tracing::info!(
        "Publish hook received: {}@{} from '{}'",
        event.package_name,
        event.published_version,
        event.source
    );

    let jobs = state.orchestrator.process_publish_event(&event).await?;

    Ok(Json(jobs))
}

/// GET /v1/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<PaginatedList<Job>>> {
    tracing::debug!("Listing jobs (page {})", query.page());

    let (jobs, total) =
        job_service::list_jobs(state.jobs.as_ref(), query.offset(), query.per_page()).await?;

    Ok(Json(PaginatedList::new(&query, jobs, total)))
}

/// GET /v1/jobs/{id}
pub async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Job>> {
    tracing::debug!("Getting job: {}", id);

    let job = job_service::get_job(state.jobs.as_ref(), id).await?;

    Ok(Json(job))
}

/// PUT /v1/jobs/{id}/state
/// Worker hand-off: claim an Idle job (`{"state": "InProgress"}`).
/// Any other change is answered with 409.
pub async fn update_job_state(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateJobState>,
) -> ApiResult<Json<Job>> {
    tracing::info!("Moving job {} to {}", id, req.state);

    let job = job_service::transition_job(state.jobs.as_ref(), id, req.state).await?;

    Ok(Json(job))
}

/// DELETE /v1/jobs/{id}
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    let job = job_service::delete_job(state.jobs.as_ref(), id).await?;

    Ok(Json(job))
}
