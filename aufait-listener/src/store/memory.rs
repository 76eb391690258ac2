//! In-memory stores
//!
//! A single mutex guards repositories and jobs, so every trait method is
//! atomic. Enforces the same rules as Postgres: unique repository names, one
//! active job per repository, version-checked job writes.

use async_trait::async_trait;
use aufait_core::domain::{Job, JobState, NewJob, Repository};
use aufait_core::dto::repository::CreateRepository;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{JobStore, RepositoryStore, StoreError, StoreResult};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    repositories: Vec<Repository>,
    /// Creation order.
    jobs: Vec<Job>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs for `repository_name` in creation order.
    pub async fn jobs_for(&self, repository_name: &str) -> Vec<Job> {
        let inner = self.inner.lock().await;
        inner
            .jobs
            .iter()
            .filter(|job| job.repository_name == repository_name)
            .cloned()
            .collect()
    }
}

impl Inner {
    fn has_active_job(&self, repository_name: &str) -> bool {
        self.jobs
            .iter()
            .any(|job| job.repository_name == repository_name && job.state.is_active())
    }

    fn insert_job(&mut self, new_job: NewJob) -> StoreResult<Job> {
        if self.has_active_job(&new_job.repository_name) {
            return Err(StoreError::Conflict(format!(
                "repository {} already has an active job",
                new_job.repository_name
            )));
        }

        let now = chrono::Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            repository_name: new_job.repository_name,
            state: JobState::Idle,
            updates: new_job.updates,
            expiration: new_job.expiration,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        self.jobs.push(job.clone());
        Ok(job)
    }

    fn write_job(&mut self, id: Uuid, job: &Job) -> StoreResult<Job> {
        let stored = self
            .jobs
            .iter_mut()
            .find(|stored| stored.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))?;

        if stored.version != job.version {
            return Err(StoreError::Conflict(format!(
                "job {id} was modified concurrently"
            )));
        }

        stored.state = job.state;
        stored.updates = job.updates.clone();
        stored.expiration = job.expiration;
        stored.version += 1;
        stored.updated_at = chrono::Utc::now();

        Ok(stored.clone())
    }

    fn name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.repositories
            .iter()
            .any(|repo| repo.name == name && Some(repo.id) != except)
    }
}

#[async_trait]
impl RepositoryStore for InMemoryStore {
    async fn create(&self, req: CreateRepository) -> StoreResult<Repository> {
        let mut inner = self.inner.lock().await;

        if inner.name_taken(&req.name, None) {
            return Err(StoreError::Conflict(format!(
                "repository {} already exists",
                req.name
            )));
        }

        let repository = Repository {
            id: Uuid::new_v4(),
            name: req.name,
            dependencies: req.dependencies,
            config: req.config,
        };
        inner.repositories.push(repository.clone());

        Ok(repository)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Repository>> {
        let inner = self.inner.lock().await;
        Ok(inner.repositories.iter().find(|repo| repo.id == id).cloned())
    }

    async fn list(&self, offset: usize, limit: usize) -> StoreResult<Vec<Repository>> {
        let inner = self.inner.lock().await;
        let mut repositories = inner.repositories.clone();
        repositories.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(repositories.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.inner.lock().await.repositories.len())
    }

    async fn update(&self, id: Uuid, req: CreateRepository) -> StoreResult<Repository> {
        let mut inner = self.inner.lock().await;

        if inner.name_taken(&req.name, Some(id)) {
            return Err(StoreError::Conflict(format!(
                "repository {} already exists",
                req.name
            )));
        }

        let repository = inner
            .repositories
            .iter_mut()
            .find(|repo| repo.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("repository {id}")))?;

        repository.name = req.name;
        repository.dependencies = req.dependencies;
        repository.config = req.config;

        Ok(repository.clone())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.repositories.len();
        inner.repositories.retain(|repo| repo.id != id);

        Ok(inner.repositories.len() < before)
    }

    async fn query_by_dependency(&self, package_name: &str) -> StoreResult<Vec<Repository>> {
        let inner = self.inner.lock().await;
        let mut repositories: Vec<Repository> = inner
            .repositories
            .iter()
            .filter(|repo| repo.dependencies.iter().any(|dep| dep.name == package_name))
            .cloned()
            .collect();
        repositories.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(repositories)
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        let inner = self.inner.lock().await;
        Ok(inner.jobs.iter().find(|job| job.id == id).cloned())
    }

    async fn list(&self, offset: usize, limit: usize) -> StoreResult<Vec<Job>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .jobs
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.inner.lock().await.jobs.len())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.jobs.len();
        inner.jobs.retain(|job| job.id != id);

        Ok(inner.jobs.len() < before)
    }

    async fn get_job_by_repository(&self, repository_name: &str) -> StoreResult<Option<Job>> {
        let inner = self.inner.lock().await;
        let mut jobs = inner
            .jobs
            .iter()
            .filter(|job| job.repository_name == repository_name);

        let current = jobs
            .clone()
            .find(|job| job.state.is_active())
            .or_else(|| jobs.rfind(|job| job.state == JobState::Locked));

        Ok(current.cloned())
    }

    async fn create_job(&self, job: NewJob) -> StoreResult<Job> {
        self.inner.lock().await.insert_job(job)
    }

    async fn update_job(&self, id: Uuid, job: &Job) -> StoreResult<Job> {
        self.inner.lock().await.write_job(id, job)
    }

    async fn lock_and_create(&self, locked: &Job, new_job: NewJob) -> StoreResult<(Job, Job)> {
        let mut inner = self.inner.lock().await;

        // Undo the lock if the create is refused, so the pair stays atomic.
        let previous = inner
            .jobs
            .iter()
            .find(|job| job.id == locked.id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {}", locked.id)))?;

        let written = inner.write_job(locked.id, locked)?;
        match inner.insert_job(new_job) {
            Ok(created) => Ok((written, created)),
            Err(err) => {
                if let Some(slot) = inner.jobs.iter_mut().find(|job| job.id == previous.id) {
                    *slot = previous;
                }
                Err(err)
            }
        }
    }
}
