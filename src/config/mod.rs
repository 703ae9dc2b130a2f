use std::path::PathBuf;
use std::time::Duration;

use garde::Validate;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    #[garde(length(min = 1))]
    pub bind_addr: String,

    /// Directory where intake spools uploads until their job finishes.
    #[serde(default = "default_upload_dir")]
    #[garde(skip)]
    pub upload_dir: PathBuf,

    /// Local artifact store used when no bucket is configured.
    #[serde(default = "default_storage_dir")]
    #[garde(skip)]
    pub storage_dir: PathBuf,

    /// Request body limit for uploads.
    #[serde(default = "default_max_upload_bytes")]
    #[garde(range(min = 1024))]
    pub max_upload_bytes: usize,

    /// S3-compatible bucket name
    #[garde(skip)]
    pub storage_bucket: Option<String>,

    /// S3-compatible endpoint URL
    #[garde(skip)]
    pub storage_endpoint: Option<String>,

    /// S3 access key ID
    #[garde(skip)]
    pub storage_access_key: Option<String>,

    /// S3 secret access key
    #[garde(skip)]
    pub storage_secret_key: Option<String>,

    /// Lifetime of the signed read reference handed to providers.
    #[serde(default = "default_sas_expiry_secs")]
    #[garde(range(min = 1, max = 604_800))]
    pub sas_expiry_secs: u32,

    /// Language every job is translated into.
    #[serde(default = "default_target_language")]
    #[garde(length(min = 2, max = 8))]
    pub target_language: String,

    #[serde(default = "default_stage_timeout_secs")]
    #[garde(range(min = 1))]
    pub stage_timeout_secs: u64,

    #[serde(default = "default_job_deadline_secs")]
    #[garde(range(min = 1))]
    pub job_deadline_secs: u64,

    #[serde(default = "default_max_concurrent_jobs")]
    #[garde(range(min = 1, max = 256))]
    pub max_concurrent_jobs: usize,

    /// Azure Computer Vision key (OCR)
    #[garde(skip)]
    pub cog_key: Option<String>,

    /// Azure Computer Vision endpoint (OCR)
    #[garde(skip)]
    pub cog_endpoint: Option<String>,

    /// Azure Translator key
    #[garde(skip)]
    pub translator_key: Option<String>,

    /// Azure Translator region, required for regional resources
    #[garde(skip)]
    pub translator_region: Option<String>,

    #[serde(default = "default_translator_endpoint")]
    #[garde(skip)]
    pub translator_endpoint: String,

    /// Azure Language (Text Analytics) key
    #[garde(skip)]
    pub text_analytics_key: Option<String>,

    /// Azure Language (Text Analytics) endpoint
    #[garde(skip)]
    pub text_analytics_endpoint: Option<String>,

    /// Cloudflare account ID (classification)
    #[garde(skip)]
    pub cf_account_id: Option<String>,

    /// Cloudflare Workers AI API token (classification)
    #[garde(skip)]
    pub cf_api_token: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("data/artifacts")
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_sas_expiry_secs() -> u32 {
    3600
}

fn default_target_language() -> String {
    "es".to_string()
}

fn default_stage_timeout_secs() -> u64 {
    30
}

fn default_job_deadline_secs() -> u64 {
    180
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_translator_endpoint() -> String {
    "https://api.cognitive.microsofttranslator.com".to_string()
}

/// Returns both values when they are present and non-blank.
pub fn credential_pair<'a>(
    first: &'a Option<String>,
    second: &'a Option<String>,
) -> Option<(&'a str, &'a str)> {
    let first = first.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let second = second.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    Some((first, second))
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with every provider absent, as used by tests and offline demos.
    pub fn offline(upload_dir: PathBuf, storage_dir: PathBuf) -> Self {
        Self {
            bind_addr: default_bind_addr(),
            upload_dir,
            storage_dir,
            max_upload_bytes: default_max_upload_bytes(),
            storage_bucket: None,
            storage_endpoint: None,
            storage_access_key: None,
            storage_secret_key: None,
            sas_expiry_secs: default_sas_expiry_secs(),
            target_language: default_target_language(),
            stage_timeout_secs: default_stage_timeout_secs(),
            job_deadline_secs: default_job_deadline_secs(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            cog_key: None,
            cog_endpoint: None,
            translator_key: None,
            translator_region: None,
            translator_endpoint: default_translator_endpoint(),
            text_analytics_key: None,
            text_analytics_endpoint: None,
            cf_account_id: None,
            cf_api_token: None,
        }
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn job_deadline(&self) -> Duration {
        Duration::from_secs(self.job_deadline_secs)
    }

    pub fn sas_expiry(&self) -> Duration {
        Duration::from_secs(u64::from(self.sas_expiry_secs))
    }

    /// Bucket settings, present only when every S3 field is set.
    pub fn object_storage(&self) -> Option<ObjectStorageConfig<'_>> {
        let (bucket, endpoint) = credential_pair(&self.storage_bucket, &self.storage_endpoint)?;
        let (access_key, secret_key) =
            credential_pair(&self.storage_access_key, &self.storage_secret_key)?;
        Some(ObjectStorageConfig {
            bucket,
            endpoint,
            access_key,
            secret_key,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectStorageConfig<'a> {
    pub bucket: &'a str,
    pub endpoint: &'a str,
    pub access_key: &'a str,
    pub secret_key: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}
