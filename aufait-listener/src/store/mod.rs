//! Store Module
//!
//! Data access layer for the listener.
//! Each store handles persistence for one domain entity. Both are trait
//! objects so the services run unchanged against Postgres or memory.
//!
//! The job store is the serialization point for the "active job per
//! repository" slot: creating a second active job for a repository and
//! writing over a job someone else changed both fail with
//! [`StoreError::Conflict`], and callers re-read and retry.

pub mod job;
pub mod memory;
pub mod repository;

use async_trait::async_trait;
use aufait_core::domain::{Job, NewJob, Repository};
use aufait_core::dto::repository::CreateRepository;
use thiserror::Error;
use uuid::Uuid;

pub use job::PgJobStore;
pub use memory::InMemoryStore;
pub use repository::PgRepositoryStore;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced record does not exist (or vanished mid-operation)
    #[error("{0} not found")]
    NotFound(String),

    /// A concurrent writer got there first
    #[error("conflict: {0}")]
    Conflict(String),

    /// Conflicts kept happening past the retry budget
    #[error("gave up on {key} after {attempts} conflicting attempts")]
    RetriesExhausted { key: String, attempts: u32 },

    /// Persisted data could not be decoded
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Lost a race: the caller should re-read and decide again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
pub(crate) fn unique_violation_or(err: sqlx::Error, message: impl FnOnce() -> String) -> StoreError {
    let is_unique = matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation());
    if is_unique {
        StoreError::Conflict(message())
    } else {
        StoreError::Database(err)
    }
}

/// Persistence for managed repositories
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Insert a repository. Names are unique.
    async fn create(&self, req: CreateRepository) -> StoreResult<Repository>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Repository>>;

    /// Page through repositories ordered by name.
    async fn list(&self, offset: usize, limit: usize) -> StoreResult<Vec<Repository>>;

    async fn count(&self) -> StoreResult<usize>;

    /// Replace a repository's name, dependencies and config.
    async fn update(&self, id: Uuid, req: CreateRepository) -> StoreResult<Repository>;

    /// Returns false when nothing was deleted.
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    /// Repositories declaring a dependency on `package_name`, ordered by name.
    async fn query_by_dependency(&self, package_name: &str) -> StoreResult<Vec<Repository>>;
}

/// Persistence for update jobs
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>>;

    /// Page through jobs, newest first.
    async fn list(&self, offset: usize, limit: usize) -> StoreResult<Vec<Job>>;

    async fn count(&self) -> StoreResult<usize>;

    /// Returns false when nothing was deleted.
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    /// The repository's current job: its active (Idle or InProgress) job if
    /// it has one, otherwise its most recently created Locked job.
    async fn get_job_by_repository(&self, repository_name: &str) -> StoreResult<Option<Job>>;

    /// Persist a new Idle job.
    ///
    /// Fails with `Conflict` if the repository already has an active job.
    async fn create_job(&self, job: NewJob) -> StoreResult<Job>;

    /// Write `job` over the stored record with the same id.
    ///
    /// Compare-and-swap on `job.version`: fails with `Conflict` if the stored
    /// version differs, `NotFound` if the record is gone. The returned job
    /// carries the new version.
    async fn update_job(&self, id: Uuid, job: &Job) -> StoreResult<Job>;

    /// Write `locked` (an InProgress job moved to Locked, same version as
    /// read) and create `new_job` as one atomic unit.
    ///
    /// Returns `(locked, created)`.
    async fn lock_and_create(&self, locked: &Job, new_job: NewJob) -> StoreResult<(Job, Job)>;
}
