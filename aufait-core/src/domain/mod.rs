//! Core domain types
//!
//! This module contains the core domain structures used across Au Fait services.
//! These types represent the fundamental business entities and are shared between
//! the listener (which merges publish events into jobs) and the update worker.

pub mod job;
pub mod publish;
pub mod repository;

pub use job::{DependencyUpdate, Job, JobState, NewJob};
pub use publish::PublishEvent;
pub use repository::{DependencyDeclaration, Repository, RepositoryConfig};
