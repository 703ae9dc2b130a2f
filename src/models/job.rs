use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::pipeline::{PipelineResult, StepRecord};

/// Lifecycle state of an image job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

/// An image job as held by the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    /// Stored artifact name (`<id><ext>`).
    pub filename: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<PipelineResult>,
    pub error: Option<String>,
    /// Trace accumulated before a fatal failure; empty otherwise.
    pub steps: Vec<StepRecord>,
}

impl JobRecord {
    pub fn queued(id: Uuid, filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            filename: filename.into(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
            steps: Vec::new(),
        }
    }
}
