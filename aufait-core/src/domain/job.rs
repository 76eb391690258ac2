//! Job domain types
//!
//! A job is the pending (or in-flight) unit of work that says "repository R
//! needs a dependency-update build", together with every published package
//! version that has been folded into it.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransitionError;

/// Dependency update job
///
/// Structure shared between the listener (creates and merges) and the
/// build worker (claims and executes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub repository_name: String,
    pub state: JobState,
    pub updates: Vec<DependencyUpdate>,
    pub expiration: Option<DateTime<Utc>>,
    /// Incremented by the store on every successful write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Accumulating updates, no worker has picked it up yet.
    Idle,
    /// A worker holds a snapshot of `updates`.
    InProgress,
    /// Superseded hand-off record. Still accepts updates, never runs again.
    Locked,
}

/// A concrete published package version folded into a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyUpdate {
    pub package_name: String,
    pub published_version: Version,
}

/// A job that has not been persisted yet
///
/// The store assigns identity, `state = Idle` and the initial version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub repository_name: String,
    pub updates: Vec<DependencyUpdate>,
    pub expiration: Option<DateTime<Utc>>,
}

impl JobState {
    pub const ALL: [JobState; 3] = [JobState::Idle, JobState::InProgress, JobState::Locked];

    /// Idle and InProgress jobs occupy the repository's single active slot.
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Idle | JobState::InProgress)
    }

    /// Whether a job in this state may have updates appended in place.
    pub fn accepts_updates(self) -> bool {
        matches!(self, JobState::Idle | JobState::Locked)
    }

    /// Validate a state change.
    ///
    /// Only two edges exist: a worker claims an Idle job, and the
    /// orchestrator locks an InProgress job when newer updates arrive.
    pub fn transition_to(self, next: JobState) -> Result<JobState, TransitionError> {
        match (self, next) {
            (JobState::Idle, JobState::InProgress) | (JobState::InProgress, JobState::Locked) => {
                Ok(next)
            }
            (from, to) => Err(TransitionError::IllegalTransition { from, to }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Idle => "Idle",
            JobState::InProgress => "InProgress",
            JobState::Locked => "Locked",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Idle" => Ok(JobState::Idle),
            "InProgress" => Ok(JobState::InProgress),
            "Locked" => Ok(JobState::Locked),
            other => Err(TransitionError::UnknownState(other.to_string())),
        }
    }
}

impl DependencyUpdate {
    pub fn new(package_name: impl Into<String>, published_version: Version) -> Self {
        Self {
            package_name: package_name.into(),
            published_version,
        }
    }
}

impl Job {
    /// Copy of this job with `update` appended.
    ///
    /// Refused for InProgress jobs: their update list is owned by a worker.
    /// Duplicates are appended as-is.
    pub fn with_update(&self, update: DependencyUpdate) -> Result<Job, TransitionError> {
        if !self.state.accepts_updates() {
            return Err(TransitionError::Frozen {
                job_id: self.id,
                state: self.state,
            });
        }

        let mut job = self.clone();
        job.updates.push(update);
        Ok(job)
    }

    /// Copy of this job moved to `next`, with its update list untouched.
    pub fn with_state(&self, next: JobState) -> Result<Job, TransitionError> {
        let mut job = self.clone();
        job.state = self.state.transition_to(next)?;
        Ok(job)
    }
}

impl NewJob {
    pub fn new(repository_name: impl Into<String>, update: DependencyUpdate) -> Self {
        Self {
            repository_name: repository_name.into(),
            updates: vec![update],
            expiration: None,
        }
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }
}
