//! Au Fait publish-hook listener
//!
//! Receives package publish notifications, finds the managed repositories
//! whose declared ranges accept the new version, and folds the update into
//! each repository's pending job for the update worker to pick up.

pub mod api;
pub mod config;
pub mod db;
pub mod service;
pub mod store;
