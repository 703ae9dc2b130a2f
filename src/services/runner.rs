//! Background execution of pipeline jobs.
//!
//! Each accepted job runs as its own tokio task, bounded by a semaphore and
//! tracked in a `JoinSet` so shutdown can wait for in-flight work.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::services::job_store::{JobStore, JobUpdate};
use crate::services::pipeline::{Pipeline, PipelineError, StagedArtifact};

pub struct JobRunner {
    pipeline: Arc<Pipeline>,
    jobs: Arc<JobStore>,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    job_deadline: Duration,
    accepting: AtomicBool,
}

impl JobRunner {
    pub fn new(
        pipeline: Arc<Pipeline>,
        jobs: Arc<JobStore>,
        max_concurrent_jobs: usize,
        job_deadline: Duration,
    ) -> Self {
        Self {
            pipeline,
            jobs,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            tasks: Mutex::new(JoinSet::new()),
            job_deadline,
            accepting: AtomicBool::new(true),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Schedule a queued job and return immediately.
    pub fn submit(&self, artifact: StagedArtifact) -> Result<(), RunnerError> {
        // Checked under the task lock so shutdown cannot take the set in between.
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.accepting.load(Ordering::Acquire) {
            return Err(RunnerError::ShuttingDown);
        }

        let pipeline = Arc::clone(&self.pipeline);
        let jobs = Arc::clone(&self.jobs);
        let permits = Arc::clone(&self.permits);
        let deadline = self.job_deadline;

        metrics::counter!("pipeline_jobs_total").increment(1);

        // Reap finished tasks so the set only holds live work.
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                tracing::error!(error = %e, "Job task ended abnormally");
            }
        }
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            execute(pipeline, jobs, artifact, deadline).await;
        });
        Ok(())
    }

    /// Stop accepting jobs and wait for every in-flight job to finish.
    pub async fn shutdown(&self) {
        let mut tasks = {
            let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            self.accepting.store(false, Ordering::Release);
            std::mem::take(&mut *guard)
        };
        tracing::info!(in_flight = tasks.len(), "Draining pipeline jobs");
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                tracing::error!(error = %e, "Job task ended abnormally");
            }
        }
    }
}

/// Run one job to a terminal state. Only the task that claims the job
/// (queued → processing) proceeds.
async fn execute(
    pipeline: Arc<Pipeline>,
    jobs: Arc<JobStore>,
    artifact: StagedArtifact,
    deadline: Duration,
) {
    let job_id = artifact.job_id;
    if let Err(e) = jobs.update(job_id, JobUpdate::Processing).await {
        tracing::warn!(job_id = %job_id, error = %e, "Job not claimable, skipping");
        return;
    }

    metrics::gauge!("pipeline_jobs_in_flight").increment(1.0);
    let start = Instant::now();

    // Steps recorded before a deadline or panic stay in `steps`.
    let mut steps = Vec::new();
    let run = AssertUnwindSafe(pipeline.run_traced(&artifact, &mut steps)).catch_unwind();
    let finished = tokio::time::timeout(deadline, run).await;

    let outcome = match finished {
        Ok(Ok(Ok(mut result))) => {
            result.steps = std::mem::take(&mut steps);
            Ok(result)
        }
        Ok(Ok(Err(error))) => Err(error),
        Ok(Err(payload)) => Err(PipelineError::Panicked(panic_message(payload.as_ref()))),
        Err(_) => Err(PipelineError::DeadlineExceeded(deadline)),
    };

    let update = match outcome {
        Ok(result) => {
            metrics::counter!("pipeline_jobs_completed").increment(1);
            tracing::info!(
                job_id = %job_id,
                language = %result.detected_language,
                classification = %result.classification,
                duration_ms = start.elapsed().as_millis() as u64,
                "Job completed"
            );
            JobUpdate::Done(result)
        }
        Err(error) => {
            metrics::counter!("pipeline_jobs_failed").increment(1);
            tracing::error!(
                job_id = %job_id,
                error = %error,
                steps = steps.len(),
                "Job failed"
            );
            JobUpdate::Error {
                message: error.to_string(),
                steps,
            }
        }
    };

    if let Err(e) = jobs.update(job_id, update).await {
        tracing::error!(job_id = %job_id, error = %e, "Failed to record job outcome");
    }

    metrics::histogram!("pipeline_processing_seconds").record(start.elapsed().as_secs_f64());
    metrics::gauge!("pipeline_jobs_in_flight").decrement(1.0);

    if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
        tracing::debug!(job_id = %job_id, error = %e, "Staged upload already gone");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Server is shutting down, no new jobs accepted")]
    ShuttingDown,
}
