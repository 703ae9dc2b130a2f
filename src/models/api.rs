use serde::{Deserialize, Serialize};

use crate::models::job::{JobRecord, JobStatus};
use crate::models::pipeline::{PipelineResult, StepRecord};

/// Response after an image is accepted for processing.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: uuid::Uuid,
    pub filename: String,
}

/// Response for querying job status.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub steps: Vec<StepRecord>,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            status: job.status,
            result: job.result,
            error: job.error,
            steps: job.steps,
        }
    }
}
