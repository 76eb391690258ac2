//! Job state machine
//!
//! Given a repository's current job (if any) and a new dependency update,
//! decide how the update folds into pending work:
//!
//! | current job | action                                          |
//! |-------------|-------------------------------------------------|
//! | none        | create a new Idle job with the update           |
//! | Idle        | append to it                                    |
//! | InProgress  | lock it (updates frozen), create a new Idle job |
//! | Locked      | append to it                                    |
//!
//! An InProgress job's update list is a snapshot held by a running worker,
//! so it is never mutated. Idle and Locked jobs have no such reader.

use uuid::Uuid;

use crate::domain::job::{DependencyUpdate, Job, JobState, NewJob};
use crate::domain::repository::Repository;

/// Persistence work required to fold one update into a repository's jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    /// No current job: persist a fresh one.
    CreateNew(NewJob),
    /// Append the update to an Idle or Locked job in place.
    AppendToExisting {
        job_id: Uuid,
        update: DependencyUpdate,
    },
    /// Freeze the running job as Locked and open a new accumulation point.
    /// One logical action, two writes.
    LockThenCreate { old_job_id: Uuid, new_job: NewJob },
}

impl JobAction {
    pub fn name(&self) -> &'static str {
        match self {
            JobAction::CreateNew(_) => "create",
            JobAction::AppendToExisting { .. } => "append",
            JobAction::LockThenCreate { .. } => "lock-then-create",
        }
    }
}

/// Decide the action for `update` against the repository's current job.
pub fn decide(existing: Option<&Job>, repository: &Repository, update: DependencyUpdate) -> JobAction {
    let Some(job) = existing else {
        return JobAction::CreateNew(NewJob::new(repository.name.clone(), update));
    };

    match job.state {
        JobState::Idle | JobState::Locked => JobAction::AppendToExisting {
            job_id: job.id,
            update,
        },
        JobState::InProgress => JobAction::LockThenCreate {
            old_job_id: job.id,
            new_job: NewJob::new(repository.name.clone(), update),
        },
    }
}
