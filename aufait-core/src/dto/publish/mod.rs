//! Publish hook DTOs

use serde::{Deserialize, Serialize};

use crate::domain::publish::PublishEvent;

/// Body of a registry `package:publish` hook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishHook {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl From<PublishHook> for PublishEvent {
    fn from(hook: PublishHook) -> Self {
        PublishEvent {
            package_name: hook.name,
            published_version: hook.version,
            source: hook.source.unwrap_or_default(),
        }
    }
}
