//! Error types for the core domain

use thiserror::Error;
use uuid::Uuid;

use crate::domain::job::JobState;

/// A publish event or request body failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Required field is missing or blank
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Version string is not a semantic version
    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// Any other rule violation
    #[error("{0}")]
    Invalid(String),
}

/// A job state change or mutation that the lifecycle forbids
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot move job from {from} to {to}")]
    IllegalTransition { from: JobState, to: JobState },

    #[error("job {job_id} is {state} and its updates are frozen")]
    Frozen { job_id: Uuid, state: JobState },

    #[error("unknown job state '{0}'")]
    UnknownState(String),
}
