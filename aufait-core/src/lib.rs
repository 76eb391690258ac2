//! Au Fait Core
//!
//! Core types and decision logic for the Au Fait dependency-update listener.
//!
//! This crate contains:
//! - Domain types: repositories, publish events, jobs and their lifecycle
//! - DTOs: request and response bodies for the listener API
//! - The version matcher deciding which repositories a publish affects
//! - The job state machine deciding how an update folds into existing work
//!
//! Nothing in here performs I/O.

pub mod domain;
pub mod dto;
pub mod error;
pub mod matcher;
pub mod state_machine;

pub use error::{TransitionError, ValidationError};
