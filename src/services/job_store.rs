//! In-process job record store shared by intake, the runner and pollers.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::job::{JobRecord, JobStatus};
use crate::models::pipeline::{PipelineResult, StepRecord};

/// Payload accompanying a status transition.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    Processing,
    Done(PipelineResult),
    Error {
        message: String,
        steps: Vec<StepRecord>,
    },
}

impl JobUpdate {
    fn status(&self) -> JobStatus {
        match self {
            JobUpdate::Processing => JobStatus::Processing,
            JobUpdate::Done(_) => JobStatus::Done,
            JobUpdate::Error { .. } => JobStatus::Error,
        }
    }
}

/// Keyed job records. Readers never block each other; writers to one id are
/// serialized by the lock and by the transition rules below.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job in `queued`.
    pub async fn create(&self, id: Uuid, filename: &str) -> Result<JobRecord, JobStoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&id) {
            return Err(JobStoreError::AlreadyExists(id));
        }
        let record = JobRecord::queued(id, filename);
        jobs.insert(id, record.clone());
        Ok(record)
    }

    /// Apply a transition. Allowed: queued → processing, and queued or
    /// processing → done | error. Terminal records are never rewritten, and
    /// only one caller can win the queued → processing claim.
    pub async fn update(&self, id: Uuid, update: JobUpdate) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;

        let to = update.status();
        let allowed = match (job.status, to) {
            (JobStatus::Queued, JobStatus::Processing) => true,
            (JobStatus::Queued | JobStatus::Processing, JobStatus::Done | JobStatus::Error) => true,
            _ => false,
        };
        if !allowed {
            return Err(JobStoreError::InvalidTransition {
                id,
                from: job.status,
                to,
            });
        }

        match update {
            JobUpdate::Processing => {}
            JobUpdate::Done(result) => job.result = Some(result),
            JobUpdate::Error { message, steps } => {
                job.error = Some(message);
                job.steps = steps;
            }
        }
        job.status = to;
        job.updated_at = Utc::now();
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Number of jobs not yet in a terminal state.
    pub async fn pending_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|job| !job.status.is_terminal())
            .count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {0} already exists")]
    AlreadyExists(Uuid),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_create_starts_queued() {
        let store = JobStore::new();
        let id = Uuid::new_v4();
        assert_ok!(store.create(id, "a.png").await);

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.result.is_none());
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = JobStore::new();
        let id = Uuid::new_v4();
        assert_ok!(store.create(id, "a.png").await);
        let err = store.create(id, "b.png").await.unwrap_err();
        assert!(matches!(err, JobStoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_terminal_state_is_write_once() {
        let store = JobStore::new();
        let id = Uuid::new_v4();
        store.create(id, "a.png").await.unwrap();
        assert_ok!(store.update(id, JobUpdate::Processing).await);
        assert_ok!(
            store
                .update(id, JobUpdate::Done(PipelineResult::new(id, "a.png")))
                .await
        );

        let err = store
            .update(
                id,
                JobUpdate::Error {
                    message: "late".to_string(),
                    steps: Vec::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidTransition { .. }));

        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_single_processing_claim() {
        let store = Arc::new(JobStore::new());
        let id = Uuid::new_v4();
        store.create(id, "a.png").await.unwrap();

        let claims = count_processing_claims(&store, id, 8).await;
        assert_eq!(claims, 1);
    }

    async fn count_processing_claims(store: &Arc<JobStore>, id: Uuid, n: usize) -> usize {
        let mut handles = Vec::new();
        for _ in 0..n {
            let store = Arc::clone(store);
            handles.push(tokio::spawn(async move {
                store.update(id, JobUpdate::Processing).await.is_ok()
            }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        wins
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store = JobStore::new();
        assert!(store.get(Uuid::new_v4()).await.is_none());
        assert_err!(store.update(Uuid::new_v4(), JobUpdate::Processing).await);
    }

    #[tokio::test]
    async fn test_pending_count() {
        let store = JobStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.create(a, "a.png").await.unwrap();
        store.create(b, "b.png").await.unwrap();
        store
            .update(
                a,
                JobUpdate::Error {
                    message: "boom".to_string(),
                    steps: Vec::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(store.pending_count().await, 1);
    }
}
