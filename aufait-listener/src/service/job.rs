//! Job Service
//!
//! Folds publish events into per-repository update jobs, plus the job
//! lifecycle operations used by the update worker and administrators.
//!
//! Processing a publish event is fail-fast: the first repository whose
//! job cannot be persisted aborts the rest. Jobs already written stay
//! written and are reported alongside the error; the publisher is expected
//! to redeliver the hook.

use std::sync::Arc;

use aufait_core::domain::{DependencyUpdate, Job, JobState, NewJob, PublishEvent, Repository};
use aufait_core::error::{TransitionError, ValidationError};
use aufait_core::matcher;
use aufait_core::state_machine::{self, JobAction};
use thiserror::Error;
use uuid::Uuid;

use crate::store::{JobStore, RepositoryStore, StoreError};

/// Service error type
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job expiration out of range (ttl {0})")]
    ExpirationOutOfRange(chrono::Duration),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, JobError>;

/// Where publish processing stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Validation,
    QueryRepositories,
    Persist { repository: String },
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Validation => f.write_str("validation"),
            Stage::QueryRepositories => f.write_str("repository lookup"),
            Stage::Persist { repository } => write!(f, "job persistence for {repository}"),
        }
    }
}

/// Publish processing failed; `committed` holds the jobs written before it did
#[derive(Debug, Error)]
#[error("publish processing failed during {stage}: {source}")]
pub struct ProcessError {
    pub stage: Stage,
    pub committed: Vec<Job>,
    pub source: JobError,
}

impl ProcessError {
    fn new(stage: Stage, committed: Vec<Job>, source: impl Into<JobError>) -> Self {
        Self {
            stage,
            committed,
            source: source.into(),
        }
    }
}

/// Retry and expiry settings for the orchestrator
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Read-decide-write attempts per repository before giving up.
    pub max_attempts: u32,
    /// Lifetime of a newly created job.
    pub job_ttl: chrono::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            job_ttl: chrono::Duration::hours(24),
        }
    }
}

/// Merges publish events into repository jobs
pub struct JobOrchestrator {
    repositories: Arc<dyn RepositoryStore>,
    jobs: Arc<dyn JobStore>,
    policy: RetryPolicy,
}

impl JobOrchestrator {
    pub fn new(
        repositories: Arc<dyn RepositoryStore>,
        jobs: Arc<dyn JobStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            repositories,
            jobs,
            policy,
        }
    }

    /// Fold a publish event into the jobs of every repository it affects.
    ///
    /// Returns the resulting job per affected repository, in lookup order.
    /// When an InProgress job is superseded, the returned job is the new
    /// Idle one.
    pub async fn process_publish_event(
        &self,
        event: &PublishEvent,
    ) -> std::result::Result<Vec<Job>, ProcessError> {
        let update = event
            .to_update()
            .map_err(|err| ProcessError::new(Stage::Validation, Vec::new(), err))?;

        let candidates = self
            .repositories
            .query_by_dependency(&event.package_name)
            .await
            .map_err(|err| ProcessError::new(Stage::QueryRepositories, Vec::new(), err))?;

        let matches = matcher::match_repositories(event, &candidates);

        tracing::info!(
            "Publish {}@{} from '{}': {} candidate(s), {} matched",
            event.package_name,
            update.published_version,
            event.source,
            candidates.len(),
            matches.len()
        );

        let mut committed = Vec::with_capacity(matches.len());
        for matched in matches {
            match self.fold_update(matched.repository, update.clone()).await {
                Ok(job) => committed.push(job),
                Err(err) => {
                    tracing::error!(
                        "Aborting publish {}@{} at repository {}: {} ({} job(s) already committed)",
                        event.package_name,
                        update.published_version,
                        matched.repository.name,
                        err,
                        committed.len()
                    );
                    let stage = Stage::Persist {
                        repository: matched.repository.name.clone(),
                    };
                    return Err(ProcessError::new(stage, committed, err));
                }
            }
        }

        Ok(committed)
    }

    /// Read the repository's current job, decide, write. Repeated when a
    /// concurrent writer changed the slot in between.
    async fn fold_update(&self, repository: &Repository, update: DependencyUpdate) -> Result<Job> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let existing = self.jobs.get_job_by_repository(&repository.name).await?;
            let action = state_machine::decide(existing.as_ref(), repository, update.clone());
            let action_name = action.name();

            match self.apply(existing, action).await {
                Ok(job) => {
                    tracing::info!(
                        "Job {} {} for repository {} ({} update(s))",
                        job.id,
                        action_name,
                        repository.name,
                        job.updates.len()
                    );
                    return Ok(job);
                }
                Err(JobError::Store(err)) if err.is_retryable() => {
                    if attempt >= self.policy.max_attempts {
                        return Err(StoreError::RetriesExhausted {
                            key: repository.name.clone(),
                            attempts: attempt,
                        }
                        .into());
                    }
                    tracing::debug!(
                        "Lost race on repository {} (attempt {}): {}",
                        repository.name,
                        attempt,
                        err
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn apply(&self, existing: Option<Job>, action: JobAction) -> Result<Job> {
        match action {
            JobAction::CreateNew(new_job) => {
                let job = self.jobs.create_job(self.stamp(new_job)?).await?;
                Ok(job)
            }
            JobAction::AppendToExisting { job_id, update } => {
                let current = existing
                    .filter(|job| job.id == job_id)
                    .ok_or(JobError::NotFound(job_id))?;
                let appended = current.with_update(update)?;
                let job = self.jobs.update_job(job_id, &appended).await?;
                Ok(job)
            }
            JobAction::LockThenCreate {
                old_job_id,
                new_job,
            } => {
                let current = existing
                    .filter(|job| job.id == old_job_id)
                    .ok_or(JobError::NotFound(old_job_id))?;
                let locked = current.with_state(JobState::Locked)?;
                let (locked, created) = self
                    .jobs
                    .lock_and_create(&locked, self.stamp(new_job)?)
                    .await?;
                tracing::info!(
                    "Job {} locked with {} update(s), superseded by {}",
                    locked.id,
                    locked.updates.len(),
                    created.id
                );
                Ok(created)
            }
        }
    }

    fn stamp(&self, new_job: NewJob) -> Result<NewJob> {
        let expiration = chrono::Utc::now()
            .checked_add_signed(self.policy.job_ttl)
            .ok_or(JobError::ExpirationOutOfRange(self.policy.job_ttl))?;
        Ok(new_job.with_expiration(expiration))
    }
}

/// Get a job by ID
pub async fn get_job(jobs: &dyn JobStore, id: Uuid) -> Result<Job> {
    let job = jobs.get(id).await?.ok_or(JobError::NotFound(id))?;
    Ok(job)
}

/// List jobs, newest first, with the total count
pub async fn list_jobs(jobs: &dyn JobStore, offset: usize, limit: usize) -> Result<(Vec<Job>, usize)> {
    let total = jobs.count().await?;
    let items = jobs.list(offset, limit).await?;
    Ok((items, total))
}

/// Worker hand-off: the only state change open to callers is claiming an
/// Idle job. Locking belongs to the orchestrator, which always pairs it with
/// a fresh Idle job.
pub async fn transition_job(jobs: &dyn JobStore, id: Uuid, next: JobState) -> Result<Job> {
    let job = get_job(jobs, id).await?;

    if (job.state, next) != (JobState::Idle, JobState::InProgress) {
        return Err(TransitionError::IllegalTransition {
            from: job.state,
            to: next,
        }
        .into());
    }

    let moved = job.with_state(next)?;
    let written = jobs.update_job(id, &moved).await?;

    tracing::info!("Job {} moved from {} to {}", id, job.state, written.state);

    Ok(written)
}

/// Delete a job, returning what was deleted
pub async fn delete_job(jobs: &dyn JobStore, id: Uuid) -> Result<Job> {
    let job = get_job(jobs, id).await?;

    if !jobs.delete(id).await? {
        return Err(JobError::NotFound(id));
    }

    tracing::info!("Job deleted: {} ({})", id, job.repository_name);

    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreResult};
    use async_trait::async_trait;
    use aufait_core::domain::{DependencyDeclaration, RepositoryConfig};
    use aufait_core::dto::repository::CreateRepository;
    use semver::Version;
    use std::collections::HashSet;

    async fn register(store: &InMemoryStore, name: &str, deps: &[(&str, &str)]) {
        store
            .create(CreateRepository {
                name: name.to_string(),
                dependencies: deps
                    .iter()
                    .map(|(n, r)| DependencyDeclaration::new(*n, *r))
                    .collect(),
                config: RepositoryConfig::default(),
            })
            .await
            .unwrap();
    }

    fn orchestrator(store: &Arc<InMemoryStore>) -> JobOrchestrator {
        JobOrchestrator::new(store.clone(), store.clone(), RetryPolicy::default())
    }

    fn event(name: &str, version: &str) -> PublishEvent {
        PublishEvent::new(name, version, "npm")
    }

    async fn app_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        register(&store, "app", &[("lodash", "^4.0.0"), ("underscore", "^1.0.0")]).await;
        store
    }

    #[tokio::test]
    async fn test_no_active_job_creates_idle_job() {
        let store = app_store().await;
        let jobs = orchestrator(&store)
            .process_publish_event(&event("lodash", "4.17.0"))
            .await
            .unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].repository_name, "app");
        assert_eq!(jobs[0].state, JobState::Idle);
        assert_eq!(
            jobs[0].updates,
            vec![DependencyUpdate::new("lodash", Version::new(4, 17, 0))]
        );
        assert!(jobs[0].expiration.is_some());
    }

    #[tokio::test]
    async fn test_idle_job_appends_without_state_change() {
        let store = app_store().await;
        let orchestrator = orchestrator(&store);

        let first = orchestrator
            .process_publish_event(&event("lodash", "4.17.0"))
            .await
            .unwrap();
        let second = orchestrator
            .process_publish_event(&event("underscore", "1.0.0"))
            .await
            .unwrap();

        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].updates.len(), 2);
        assert_eq!(second[0].state, JobState::Idle);
        assert_eq!(store.jobs_for("app").await.len(), 1);
    }

    #[tokio::test]
    async fn test_in_progress_job_is_locked_and_split() {
        let store = app_store().await;
        let orchestrator = orchestrator(&store);

        let first = orchestrator
            .process_publish_event(&event("lodash", "4.17.0"))
            .await
            .unwrap()
            .remove(0);
        transition_job(store.as_ref(), first.id, JobState::InProgress)
            .await
            .unwrap();

        let result = orchestrator
            .process_publish_event(&event("underscore", "1.0.0"))
            .await
            .unwrap();

        let original = get_job(store.as_ref(), first.id).await.unwrap();
        assert_eq!(original.state, JobState::Locked);
        assert_eq!(original.updates, first.updates);

        let new_job = &result[0];
        assert_ne!(new_job.id, first.id);
        assert_eq!(new_job.state, JobState::Idle);
        assert_eq!(
            new_job.updates,
            vec![DependencyUpdate::new("underscore", Version::new(1, 0, 0))]
        );
    }

    #[tokio::test]
    async fn test_locked_job_appends_without_new_job() {
        let store = app_store().await;
        let orchestrator = orchestrator(&store);

        let first = orchestrator
            .process_publish_event(&event("lodash", "4.17.0"))
            .await
            .unwrap()
            .remove(0);
        transition_job(store.as_ref(), first.id, JobState::InProgress)
            .await
            .unwrap();
        let replacement = orchestrator
            .process_publish_event(&event("underscore", "1.0.0"))
            .await
            .unwrap()
            .remove(0);

        // Replacement consumed externally: the Locked job is current again.
        delete_job(store.as_ref(), replacement.id).await.unwrap();

        let result = orchestrator
            .process_publish_event(&event("underscore", "1.0.0"))
            .await
            .unwrap();

        assert_eq!(result[0].id, first.id);
        assert_eq!(result[0].state, JobState::Locked);
        assert_eq!(result[0].updates.len(), 2);
        assert_eq!(store.jobs_for("app").await.len(), 1);
    }

    #[tokio::test]
    async fn test_replayed_event_appends_duplicates() {
        let store = app_store().await;
        let orchestrator = orchestrator(&store);

        let mut last_len = 0;
        for _ in 0..3 {
            let jobs = orchestrator
                .process_publish_event(&event("lodash", "4.17.0"))
                .await
                .unwrap();
            assert!(jobs[0].updates.len() > last_len);
            last_len = jobs[0].updates.len();
        }

        let jobs = store.jobs_for("app").await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].updates.len(), 3);
        assert!(
            jobs[0]
                .updates
                .iter()
                .all(|u| *u == DependencyUpdate::new("lodash", Version::new(4, 17, 0)))
        );
    }

    #[tokio::test]
    async fn test_validation_error_touches_nothing() {
        let store = app_store().await;
        let err = orchestrator(&store)
            .process_publish_event(&event("lodash", "not-a-version"))
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Validation);
        assert!(matches!(err.source, JobError::Validation(_)));
        assert!(err.committed.is_empty());
        assert!(store.jobs_for("app").await.is_empty());
    }

    #[tokio::test]
    async fn test_only_matching_repositories_get_jobs() {
        let store = Arc::new(InMemoryStore::new());
        register(&store, "legacy", &[("lodash", "^3.0.0")]).await;
        register(&store, "web", &[("lodash", ">=4.0.0 <5.0.0")]).await;
        register(&store, "api", &[("express", "*")]).await;
        register(&store, "app", &[("lodash", "^4.0.0")]).await;

        let jobs = orchestrator(&store)
            .process_publish_event(&event("lodash", "4.17.0"))
            .await
            .unwrap();

        let names: Vec<_> = jobs.iter().map(|j| j.repository_name.as_str()).collect();
        assert_eq!(names, vec!["app", "web"]);
        assert!(store.jobs_for("legacy").await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_events_create_exactly_one_job() {
        const N: usize = 8;

        let store = Arc::new(InMemoryStore::new());
        let deps: Vec<(String, String)> = (0..N).map(|i| (format!("pkg-{i}"), "*".to_string())).collect();
        let deps_ref: Vec<(&str, &str)> = deps.iter().map(|(n, r)| (n.as_str(), r.as_str())).collect();
        register(&store, "app", &deps_ref).await;

        let policy = RetryPolicy {
            max_attempts: N as u32 * 2,
            ..RetryPolicy::default()
        };
        let orchestrator = Arc::new(JobOrchestrator::new(store.clone(), store.clone(), policy));

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator
                        .process_publish_event(&event(&format!("pkg-{i}"), "1.0.0"))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let jobs = store.jobs_for("app").await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].updates.len(), N);

        let packages: HashSet<_> = jobs[0].updates.iter().map(|u| u.package_name.clone()).collect();
        let expected: HashSet<_> = (0..N).map(|i| format!("pkg-{i}")).collect();
        assert_eq!(packages, expected);
    }

    /// Delegates to memory, failing creates for one repository.
    struct FailingJobStore {
        inner: InMemoryStore,
        fail_for: String,
        error: fn() -> StoreError,
        /// Number of failing creates left; `None` fails forever.
        remaining: std::sync::Mutex<Option<u32>>,
    }

    impl FailingJobStore {
        fn should_fail(&self, repository_name: &str) -> bool {
            if repository_name != self.fail_for {
                return false;
            }
            let mut remaining = self.remaining.lock().unwrap();
            match remaining.as_mut() {
                None => true,
                Some(0) => false,
                Some(n) => {
                    *n -= 1;
                    true
                }
            }
        }
    }

    #[async_trait]
    impl JobStore for FailingJobStore {
        async fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
            JobStore::get(&self.inner, id).await
        }

        async fn list(&self, offset: usize, limit: usize) -> StoreResult<Vec<Job>> {
            JobStore::list(&self.inner, offset, limit).await
        }

        async fn count(&self) -> StoreResult<usize> {
            JobStore::count(&self.inner).await
        }

        async fn delete(&self, id: Uuid) -> StoreResult<bool> {
            JobStore::delete(&self.inner, id).await
        }

        async fn get_job_by_repository(&self, repository_name: &str) -> StoreResult<Option<Job>> {
            self.inner.get_job_by_repository(repository_name).await
        }

        async fn create_job(&self, job: NewJob) -> StoreResult<Job> {
            if self.should_fail(&job.repository_name) {
                return Err((self.error)());
            }
            self.inner.create_job(job).await
        }

        async fn update_job(&self, id: Uuid, job: &Job) -> StoreResult<Job> {
            self.inner.update_job(id, job).await
        }

        async fn lock_and_create(&self, locked: &Job, new_job: NewJob) -> StoreResult<(Job, Job)> {
            self.inner.lock_and_create(locked, new_job).await
        }
    }

    async fn failing_setup(
        error: fn() -> StoreError,
        failures: Option<u32>,
    ) -> (Arc<FailingJobStore>, JobOrchestrator) {
        let repositories = Arc::new(InMemoryStore::new());
        register(&repositories, "a", &[("lodash", "*")]).await;
        register(&repositories, "b", &[("lodash", "*")]).await;
        register(&repositories, "c", &[("lodash", "*")]).await;

        let jobs = Arc::new(FailingJobStore {
            inner: InMemoryStore::new(),
            fail_for: "b".to_string(),
            error,
            remaining: std::sync::Mutex::new(failures),
        });
        let orchestrator = JobOrchestrator::new(repositories, jobs.clone(), RetryPolicy::default());
        (jobs, orchestrator)
    }

    #[tokio::test]
    async fn test_store_error_aborts_and_reports_committed_jobs() {
        let (jobs, orchestrator) =
            failing_setup(|| StoreError::Corrupt("disk on fire".to_string()), None).await;

        let err = orchestrator
            .process_publish_event(&event("lodash", "1.0.0"))
            .await
            .unwrap_err();

        assert_eq!(
            err.stage,
            Stage::Persist {
                repository: "b".to_string()
            }
        );
        assert_eq!(err.committed.len(), 1);
        assert_eq!(err.committed[0].repository_name, "a");
        assert!(matches!(err.source, JobError::Store(StoreError::Corrupt(_))));

        // "c" was never attempted.
        assert!(jobs.inner.jobs_for("c").await.is_empty());
    }

    #[tokio::test]
    async fn test_endless_conflicts_surface_as_store_error() {
        let (_, orchestrator) =
            failing_setup(|| StoreError::Conflict("always".to_string()), None).await;

        let err = orchestrator
            .process_publish_event(&event("lodash", "1.0.0"))
            .await
            .unwrap_err();

        assert!(matches!(
            err.source,
            JobError::Store(StoreError::RetriesExhausted { attempts: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_illegal_transition_is_rejected() {
        let store = app_store().await;
        let job = orchestrator(&store)
            .process_publish_event(&event("lodash", "4.17.0"))
            .await
            .unwrap()
            .remove(0);

        let result = transition_job(store.as_ref(), job.id, JobState::Locked).await;
        assert!(matches!(result, Err(JobError::Transition(_))));
    }

    #[tokio::test]
    async fn test_job_vanishing_mid_write_is_retried() {
        let (jobs, orchestrator) =
            failing_setup(|| StoreError::NotFound("job".to_string()), Some(1)).await;

        let result = orchestrator
            .process_publish_event(&event("lodash", "1.0.0"))
            .await
            .unwrap();

        let names: Vec<_> = result.iter().map(|j| j.repository_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(jobs.inner.jobs_for("b").await.len(), 1);
    }

    #[tokio::test]
    async fn test_locking_is_not_open_to_callers() {
        let store = app_store().await;
        let job = orchestrator(&store)
            .process_publish_event(&event("lodash", "4.17.0"))
            .await
            .unwrap()
            .remove(0);
        transition_job(store.as_ref(), job.id, JobState::InProgress)
            .await
            .unwrap();

        let result = transition_job(store.as_ref(), job.id, JobState::Locked).await;
        assert!(matches!(
            result,
            Err(JobError::Transition(TransitionError::IllegalTransition {
                from: JobState::InProgress,
                to: JobState::Locked,
            }))
        ));

        let stored = get_job(store.as_ref(), job.id).await.unwrap();
        assert_eq!(stored.state, JobState::InProgress);
    }

    #[tokio::test]
    async fn test_unrepresentable_expiration_is_an_error() {
        let store = app_store().await;
        let policy = RetryPolicy {
            job_ttl: chrono::Duration::MAX,
            ..RetryPolicy::default()
        };
        let orchestrator = JobOrchestrator::new(store.clone(), store.clone(), policy);

        let err = orchestrator
            .process_publish_event(&event("lodash", "4.17.0"))
            .await
            .unwrap_err();

        assert!(matches!(err.source, JobError::ExpirationOutOfRange(_)));
        assert!(store.jobs_for("app").await.is_empty());
    }
}
