//! Job Store
//!
//! Postgres persistence for update jobs.
//!
//! The partial unique index `idx_jobs_active_repository` guarantees at most
//! one Idle or InProgress job per repository; every write is conditional on
//! the `version` column read by the caller.

use async_trait::async_trait;
use aufait_core::domain::{Job, JobState, NewJob};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::{JobStore, StoreError, StoreResult, unique_violation_or};

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, repository_name, state, updates, expiration, version,
                   created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn list(&self, offset: usize, limit: usize) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, repository_name, state, updates, expiration, version,
                   created_at, updated_at
            FROM jobs
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn count(&self) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_job_by_repository(&self, repository_name: &str) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT id, repository_name, state, updates, expiration, version,
                   created_at, updated_at
            FROM jobs
            WHERE repository_name = $1
            ORDER BY CASE WHEN state IN ('Idle', 'InProgress') THEN 0 ELSE 1 END,
                     created_at DESC
            LIMIT 1
            "#,
        )
        .bind(repository_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn create_job(&self, job: NewJob) -> StoreResult<Job> {
        insert_job(&self.pool, &job).await
    }

    async fn update_job(&self, id: Uuid, job: &Job) -> StoreResult<Job> {
        match write_job(&self.pool, id, job).await? {
            Some(written) => Ok(written),
            None => Err(lost_race(id, job_exists(&self.pool, id).await?)),
        }
    }

    async fn lock_and_create(&self, locked: &Job, new_job: NewJob) -> StoreResult<(Job, Job)> {
        let mut tx = self.pool.begin().await?;

        // Lock first: the old InProgress row still occupies the active slot.
        let Some(written) = write_job(&mut *tx, locked.id, locked).await? else {
            let exists = job_exists(&mut *tx, locked.id).await?;
            return Err(lost_race(locked.id, exists));
        };

        let created = insert_job(&mut *tx, &new_job).await?;
        tx.commit().await?;

        Ok((written, created))
    }
}

// =============================================================================
// Query Helpers
// =============================================================================

async fn insert_job<'e, E>(executor: E, job: &NewJob) -> StoreResult<Job>
where
    E: PgExecutor<'e>,
{
    let now = chrono::Utc::now();
    let updates = serde_json::to_value(&job.updates)
        .map_err(|err| StoreError::Corrupt(format!("job updates: {err}")))?;

    let row = sqlx::query_as::<_, JobRow>(
        r#"
        INSERT INTO jobs (id, repository_name, state, updates, expiration, version,
                          created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 0, $6, $6)
        RETURNING id, repository_name, state, updates, expiration, version,
                  created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&job.repository_name)
    .bind(JobState::Idle.as_str())
    .bind(updates)
    .bind(job.expiration)
    .bind(now)
    .fetch_one(executor)
    .await
    .map_err(|err| active_job_conflict(err, &job.repository_name))?;

    Job::try_from(row)
}

/// Conditional write. `None` means the id/version pair did not match.
async fn write_job<'e, E>(executor: E, id: Uuid, job: &Job) -> StoreResult<Option<Job>>
where
    E: PgExecutor<'e>,
{
    let updates = serde_json::to_value(&job.updates)
        .map_err(|err| StoreError::Corrupt(format!("job updates: {err}")))?;

    let row = sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE jobs
        SET state = $1, updates = $2, expiration = $3, version = version + 1, updated_at = $4
        WHERE id = $5 AND version = $6
        RETURNING id, repository_name, state, updates, expiration, version,
                  created_at, updated_at
        "#,
    )
    .bind(job.state.as_str())
    .bind(updates)
    .bind(job.expiration)
    .bind(chrono::Utc::now())
    .bind(id)
    .bind(job.version)
    .fetch_optional(executor)
    .await
    .map_err(|err| active_job_conflict(err, &job.repository_name))?;

    row.map(Job::try_from).transpose()
}

async fn job_exists<'e, E>(executor: E, id: Uuid) -> StoreResult<bool>
where
    E: PgExecutor<'e>,
{
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM jobs WHERE id = $1)")
        .bind(id)
        .fetch_one(executor)
        .await?;

    Ok(exists)
}

fn active_job_conflict(err: sqlx::Error, repository_name: &str) -> StoreError {
    unique_violation_or(err, || {
        format!("repository {repository_name} already has an active job")
    })
}

fn lost_race(id: Uuid, exists: bool) -> StoreError {
    if exists {
        StoreError::Conflict(format!("job {id} was modified concurrently"))
    } else {
        StoreError::NotFound(format!("job {id}"))
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    repository_name: String,
    state: String,
    updates: serde_json::Value,
    expiration: Option<chrono::DateTime<chrono::Utc>>,
    version: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<JobState>()
            .map_err(|err| StoreError::Corrupt(format!("job {}: {err}", row.id)))?;

        let updates = serde_json::from_value(row.updates)
            .map_err(|err| StoreError::Corrupt(format!("job {} updates: {err}", row.id)))?;

        Ok(Job {
            id: row.id,
            repository_name: row.repository_name,
            state,
            updates,
            expiration: row.expiration,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
