//! Job DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::JobState;

/// State change requested by the update worker
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateJobState {
    pub state: JobState,
}
