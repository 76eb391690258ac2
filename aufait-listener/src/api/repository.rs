//! Repository API Handlers
//!
//! HTTP endpoints for managed repository registration.

use aufait_core::domain::Repository;
use aufait_core::dto::repository::CreateRepository;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::api::pagination::{PageQuery, PaginatedList};
use crate::service::repository_service;

/// POST /v1/repositories
pub async fn create_repository(
    State(state): State<AppState>,
    Json(req): Json<CreateRepository>,
) -> ApiResult<(StatusCode, Json<Repository>)> {
    tracing::info!("Registering repository: {}", req.name);

    let repository =
        repository_service::create_repository(state.repositories.as_ref(), req).await?;

    Ok((StatusCode::CREATED, Json(repository)))
}

/// GET /v1/repositories
pub async fn list_repositories(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<PaginatedList<Repository>>> {
    tracing::debug!("Listing repositories (page {})", query.page());

    let (repositories, total) = repository_service::list_repositories(
        state.repositories.as_ref(),
        query.offset(),
        query.per_page(),
    )
    .await?;

    Ok(Json(PaginatedList::new(&query, repositories, total)))
}

/// GET /v1/repositories/{id}
pub async fn get_repository(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Repository>> {
    tracing::debug!("Getting repository: {}", id);

    let repository = repository_service::get_repository(state.repositories.as_ref(), id).await?;

    Ok(Json(repository))
}

/// PUT /v1/repositories/{id}
pub async fn update_repository(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateRepository>,
) -> ApiResult<Json<Repository>> {
    let repository =
        repository_service::update_repository(state.repositories.as_ref(), id, req).await?;

    Ok(Json(repository))
}

/// DELETE /v1/repositories/{id}
pub async fn delete_repository(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Repository>> {
    let repository =
        repository_service::delete_repository(state.repositories.as_ref(), id).await?;

    Ok(Json(repository))
}
