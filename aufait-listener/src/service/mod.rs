//! Service Module
//!
//! Business logic layer for the listener.
//! Services sit between the HTTP handlers and the stores and hold the
//! domain rules: validation, job folding, lifecycle transitions.

pub mod job;
pub mod repository;

pub use job as job_service;
pub use repository as repository_service;
