//! Data Transfer Objects for the listener API
//!
//! Request and response bodies exchanged with publishers, the update worker
//! and administrative clients.

pub mod job;
pub mod publish;
pub mod repository;
