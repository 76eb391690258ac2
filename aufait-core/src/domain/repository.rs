//! Repository domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A managed repository registered with the listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub name: String,
    pub dependencies: Vec<DependencyDeclaration>,
    pub config: RepositoryConfig,
}

/// A repository's requirement on a named package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyDeclaration {
    pub name: String,
    /// Acceptable version range, npm or Cargo spelling.
    pub semver_range: String,
    /// Currently installed version. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<String>,
}

/// Where the update worker pushes its branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub branch: String,
    pub remote: String,
}

impl Repository {
    /// First declaration of `package_name`. Later duplicates are ignored.
    pub fn dependency(&self, package_name: &str) -> Option<&DependencyDeclaration> {
        self.dependencies.iter().find(|dep| dep.name == package_name)
    }
}

impl DependencyDeclaration {
    pub fn new(name: impl Into<String>, semver_range: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            semver_range: semver_range.into(),
            installed: None,
        }
    }
}
