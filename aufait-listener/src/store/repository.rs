//! Repository Store
//!
//! Postgres persistence for managed repositories. Dependencies and config
//! are stored as JSONB so dependency lookups can use containment.

use async_trait::async_trait;
use aufait_core::domain::{DependencyDeclaration, Repository, RepositoryConfig};
use aufait_core::dto::repository::CreateRepository;
use sqlx::PgPool;
use uuid::Uuid;

use super::{RepositoryStore, StoreError, StoreResult, unique_violation_or};

#[derive(Debug, Clone)]
pub struct PgRepositoryStore {
    pool: PgPool,
}

impl PgRepositoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RepositoryStore for PgRepositoryStore {
    async fn create(&self, req: CreateRepository) -> StoreResult<Repository> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let (dependencies, config) = encode(&req)?;

        let row = sqlx::query_as::<_, RepositoryRow>(
            r#"
            INSERT INTO repositories (id, name, dependencies, config, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, name, dependencies, config
            "#,
        )
        .bind(id)
        .bind(&req.name)
        .bind(dependencies)
        .bind(config)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| name_conflict(err, &req.name))?;

        Repository::try_from(row)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Repository>> {
        let row = sqlx::query_as::<_, RepositoryRow>(
            r#"
            SELECT id, name, dependencies, config
            FROM repositories
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Repository::try_from).transpose()
    }

    async fn list(&self, offset: usize, limit: usize) -> StoreResult<Vec<Repository>> {
        let rows = sqlx::query_as::<_, RepositoryRow>(
            r#"
            SELECT id, name, dependencies, config
            FROM repositories
            ORDER BY name ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Repository::try_from).collect()
    }

    async fn count(&self) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repositories")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }

    async fn update(&self, id: Uuid, req: CreateRepository) -> StoreResult<Repository> {
        let (dependencies, config) = encode(&req)?;

        let row = sqlx::query_as::<_, RepositoryRow>(
            r#"
            UPDATE repositories
            SET name = $1, dependencies = $2, config = $3, updated_at = $4
            WHERE id = $5
            RETURNING id, name, dependencies, config
            "#,
        )
        .bind(&req.name)
        .bind(dependencies)
        .bind(config)
        .bind(chrono::Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| name_conflict(err, &req.name))?;

        row.map(Repository::try_from)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound(format!("repository {id}")))
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM repositories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn query_by_dependency(&self, package_name: &str) -> StoreResult<Vec<Repository>> {
        let rows = sqlx::query_as::<_, RepositoryRow>(
            r#"
            SELECT id, name, dependencies, config
            FROM repositories
            WHERE dependencies @> jsonb_build_array(jsonb_build_object('name', $1::text))
            ORDER BY name ASC
            "#,
        )
        .bind(package_name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Repository::try_from).collect()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn encode(req: &CreateRepository) -> StoreResult<(serde_json::Value, serde_json::Value)> {
    let dependencies = serde_json::to_value(&req.dependencies)
        .map_err(|err| StoreError::Corrupt(format!("repository dependencies: {err}")))?;
    let config = serde_json::to_value(&req.config)
        .map_err(|err| StoreError::Corrupt(format!("repository config: {err}")))?;

    Ok((dependencies, config))
}

fn name_conflict(err: sqlx::Error, name: &str) -> StoreError {
    unique_violation_or(err, || format!("repository {name} already exists"))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RepositoryRow {
    id: Uuid,
    name: String,
    dependencies: serde_json::Value,
    config: serde_json::Value,
}

impl TryFrom<RepositoryRow> for Repository {
    type Error = StoreError;

    fn try_from(row: RepositoryRow) -> Result<Self, Self::Error> {
        let dependencies: Vec<DependencyDeclaration> = serde_json::from_value(row.dependencies)
            .map_err(|err| StoreError::Corrupt(format!("repository {}: {err}", row.name)))?;
        let config: RepositoryConfig = serde_json::from_value(row.config)
            .map_err(|err| StoreError::Corrupt(format!("repository {}: {err}", row.name)))?;

        Ok(Repository {
            id: row.id,
            name: row.name,
            dependencies,
            config,
        })
    }
}
