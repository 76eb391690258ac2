//! Publish event domain types

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::domain::job::DependencyUpdate;
use crate::error::ValidationError;

/// Notification that a package was published at a given version
///
/// Fields are kept exactly as received. Use [`PublishEvent::validate`] to
/// obtain the parsed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishEvent {
    pub package_name: String,
    pub published_version: String,
    pub source: String,
}

impl PublishEvent {
    pub fn new(
        package_name: impl Into<String>,
        published_version: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            published_version: published_version.into(),
            source: source.into(),
        }
    }

    /// Check required fields and parse the published version.
    pub fn validate(&self) -> Result<Version, ValidationError> {
        if self.package_name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }

        if self.published_version.trim().is_empty() {
            return Err(ValidationError::MissingField("version"));
        }

        self.parsed_version()
            .map_err(|err| ValidationError::InvalidVersion {
                version: self.published_version.clone(),
                reason: err.to_string(),
            })
    }

    pub fn parsed_version(&self) -> Result<Version, semver::Error> {
        Version::parse(self.published_version.trim())
    }

    /// The update this event contributes to a job.
    pub fn to_update(&self) -> Result<DependencyUpdate, ValidationError> {
        let version = self.validate()?;
        Ok(DependencyUpdate::new(self.package_name.clone(), version))
    }
}
