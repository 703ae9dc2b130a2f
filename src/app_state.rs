use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    job_store::JobStore,
    pipeline::{Pipeline, PipelineSettings},
    providers::Providers,
    runner::JobRunner,
    storage::{ArtifactStore, LocalStorage, S3Storage, StorageError},
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobStore>,
    pub runner: Arc<JobRunner>,
    pub upload_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(jobs: Arc<JobStore>, runner: Arc<JobRunner>, upload_dir: PathBuf) -> Self {
        Self {
            jobs,
            runner,
            upload_dir: Arc::new(upload_dir),
        }
    }

    /// Wire storage, providers, pipeline and runner from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, StorageError> {
        let storage: Arc<dyn ArtifactStore> = match config.object_storage() {
            Some(bucket) => {
                tracing::info!(bucket = bucket.bucket, "Using S3-compatible artifact storage");
                Arc::new(S3Storage::new(bucket)?)
            }
            None => {
                tracing::info!(dir = %config.storage_dir.display(), "Using local artifact storage");
                Arc::new(LocalStorage::new(config.storage_dir.clone()))
            }
        };

        Ok(Self::with_parts(config, storage, Providers::from_config(config)))
    }

    /// Build state around explicit storage and providers.
    pub fn with_parts(
        config: &AppConfig,
        storage: Arc<dyn ArtifactStore>,
        providers: Providers,
    ) -> Self {
        let settings = PipelineSettings {
            target_language: config.target_language.clone(),
            sas_expiry: config.sas_expiry(),
            stage_timeout: config.stage_timeout(),
        };
        let pipeline = Arc::new(Pipeline::new(storage, providers, settings));
        let jobs = Arc::new(JobStore::new());
        let runner = Arc::new(JobRunner::new(
            pipeline,
            Arc::clone(&jobs),
            config.max_concurrent_jobs,
            config.job_deadline(),
        ));

        Self::new(jobs, runner, config.upload_dir.clone())
    }
}
