//! Repository DTOs

use serde::{Deserialize, Serialize};

use crate::domain::repository::{DependencyDeclaration, RepositoryConfig};

/// Request to register or replace a managed repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRepository {
    pub name: String,
    pub dependencies: Vec<DependencyDeclaration>,
    #[serde(default)]
    pub config: RepositoryConfig,
}
