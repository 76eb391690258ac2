//! Repository Service
//!
//! Registration and maintenance of managed repositories.

use aufait_core::domain::Repository;
use aufait_core::dto::repository::CreateRepository;
use aufait_core::error::ValidationError;
use thiserror::Error;
use uuid::Uuid;

use crate::store::{RepositoryStore, StoreError};

const MAX_NAME_LEN: usize = 255;

/// Service error type
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Register a new repository
pub async fn create_repository(
    repositories: &dyn RepositoryStore,
    req: CreateRepository,
) -> Result<Repository> {
    validate_repository_request(&req)?;

    let repository = repositories.create(req).await?;

    tracing::info!(
        "Repository registered: {} ({}) with {} dependencies",
        repository.name,
        repository.id,
        repository.dependencies.len()
    );

    Ok(repository)
}

/// Get a repository by ID
pub async fn get_repository(repositories: &dyn RepositoryStore, id: Uuid) -> Result<Repository> {
    let repository = repositories
        .get(id)
        .await?
        .ok_or(RepositoryError::NotFound(id))?;

    Ok(repository)
}

/// List repositories by name, with the total count
pub async fn list_repositories(
    repositories: &dyn RepositoryStore,
    offset: usize,
    limit: usize,
) -> Result<(Vec<Repository>, usize)> {
    let total = repositories.count().await?;
    let items = repositories.list(offset, limit).await?;
    Ok((items, total))
}

/// Replace a repository's definition
pub async fn update_repository(
    repositories: &dyn RepositoryStore,
    id: Uuid,
    req: CreateRepository,
) -> Result<Repository> {
    validate_repository_request(&req)?;

    let repository = repositories.update(id, req).await.map_err(|err| match err {
        StoreError::NotFound(_) => RepositoryError::NotFound(id),
        other => other.into(),
    })?;

    tracing::info!("Repository updated: {} ({})", repository.name, repository.id);

    Ok(repository)
}

/// Unregister a repository, returning what was deleted
pub async fn delete_repository(repositories: &dyn RepositoryStore, id: Uuid) -> Result<Repository> {
    let repository = get_repository(repositories, id).await?;

    if !repositories.delete(id).await? {
        return Err(RepositoryError::NotFound(id));
    }

    tracing::info!("Repository deleted: {} ({})", repository.name, id);

    Ok(repository)
}

fn validate_repository_request(req: &CreateRepository) -> std::result::Result<(), ValidationError> {
    if req.name.trim().is_empty() {
        return Err(ValidationError::MissingField("name"));
    }

    if req.name.len() > MAX_NAME_LEN {
        return Err(ValidationError::Invalid(format!(
            "repository name too long (max {MAX_NAME_LEN} characters)"
        )));
    }

    if req.dependencies.is_empty() {
        return Err(ValidationError::Invalid(
            "repository must declare at least one dependency".to_string(),
        ));
    }

    if req.dependencies.iter().any(|dep| dep.name.trim().is_empty()) {
        return Err(ValidationError::MissingField("dependencies[].name"));
    }

    Ok(())
}
