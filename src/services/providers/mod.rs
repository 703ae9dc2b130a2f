//! Capability providers: one trait per external AI function.
//!
//! Each capability is resolved once at startup into [`Capability::Configured`]
//! (credentials present) or [`Capability::Absent`]; the pipeline picks its
//! fallback path from that variant rather than from the environment.

pub mod azure;
pub mod workers_ai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::config::{credential_pair, AppConfig};
use crate::models::pipeline::{Classification, TextInsights};
use crate::services::storage::ArtifactRef;

#[async_trait]
pub trait OcrProvider: Send + Sync {
    async fn analyze(&self, artifact: &ArtifactRef) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait LanguageDetector: Send + Sync {
    /// ISO 639-1 code of the dominant language, `None` when the provider could not tell.
    async fn detect_language(&self, text: &str) -> Result<Option<String>, ProviderError>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze_text(
        &self,
        text: &str,
        language: Option<&str>,
    ) -> Result<TextInsights, ProviderError>;
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        categories: &[&str],
    ) -> Result<Classification, ProviderError>;
}

/// A provider that is either backed by a live service or deliberately absent.
pub enum Capability<T: ?Sized> {
    Configured(Arc<T>),
    Absent,
}

impl<T: ?Sized> Capability<T> {
    pub fn configured(&self) -> Option<&Arc<T>> {
        match self {
            Capability::Configured(provider) => Some(provider),
            Capability::Absent => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, Capability::Configured(_))
    }
}

impl<T: ?Sized> Clone for Capability<T> {
    fn clone(&self) -> Self {
        match self {
            Capability::Configured(provider) => Capability::Configured(Arc::clone(provider)),
            Capability::Absent => Capability::Absent,
        }
    }
}

impl<T: ?Sized> Default for Capability<T> {
    fn default() -> Self {
        Capability::Absent
    }
}

/// The full provider set handed to the pipeline.
#[derive(Clone, Default)]
pub struct Providers {
    pub ocr: Capability<dyn OcrProvider>,
    pub language: Capability<dyn LanguageDetector>,
    pub translator: Capability<dyn Translator>,
    pub analyzer: Capability<dyn TextAnalyzer>,
    pub classifier: Capability<dyn Classifier>,
}

impl Providers {
    /// Resolve every capability from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let http = reqwest::Client::new();
        let mut providers = Providers::default();

        if let Some((key, endpoint)) = credential_pair(&config.cog_key, &config.cog_endpoint) {
            providers.ocr = Capability::Configured(Arc::new(azure::AzureVisionOcr::new(
                http.clone(),
                endpoint,
                key,
            )));
        }

        if let Some((key, endpoint)) =
            credential_pair(&config.text_analytics_key, &config.text_analytics_endpoint)
        {
            let language = Arc::new(azure::AzureLanguageClient::new(http.clone(), endpoint, key));
            providers.language = Capability::Configured(language.clone());
            providers.analyzer = Capability::Configured(language);
        }

        let translator_endpoint = Some(config.translator_endpoint.clone());
        if let Some((key, endpoint)) =
            credential_pair(&config.translator_key, &translator_endpoint)
        {
            providers.translator = Capability::Configured(Arc::new(azure::AzureTranslator::new(
                http.clone(),
                endpoint,
                key,
                config.translator_region.clone(),
            )));
        }

        if let Some((account_id, token)) =
            credential_pair(&config.cf_account_id, &config.cf_api_token)
        {
            providers.classifier = Capability::Configured(Arc::new(
                workers_ai::WorkersAiClassifier::new(http, account_id, token),
            ));
        }

        tracing::info!(
            ocr = providers.ocr.is_configured(),
            language_detection = providers.language.is_configured(),
            translation = providers.translator.is_configured(),
            text_analytics = providers.analyzer.is_configured(),
            classification = providers.classifier.is_configured(),
            "Resolved capability providers"
        );

        providers
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider rejected the credentials ({status}): check the key. {detail}")]
    Auth { status: u16, detail: String },

    #[error("Provider endpoint looks wrong ({status}): check the endpoint URL. {detail}")]
    Endpoint { status: u16, detail: String },

    #[error("Provider returned status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Unexpected provider response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ProviderError::MalformedResponse(err.to_string());
        }
        if err.is_builder() || looks_like_bad_host(&err) {
            return ProviderError::Endpoint {
                status: 0,
                detail: err.to_string(),
            };
        }
        ProviderError::Transport(err)
    }
}

fn looks_like_bad_host(err: &reqwest::Error) -> bool {
    if !err.is_connect() {
        return false;
    }
    let mut source: Option<&dyn std::error::Error> = Some(err);
    while let Some(cause) = source {
        let text = cause.to_string().to_lowercase();
        if text.contains("dns") || text.contains("resolve") || text.contains("no such host") {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Classify a non-success response by status code and body text.
pub fn classify_failure(status: StatusCode, body: &str) -> ProviderError {
    let detail: String = body.chars().take(300).collect();
    let lowered = body.to_lowercase();
    let code = status.as_u16();

    let mentions_key = lowered.contains("subscription key")
        || lowered.contains("api key")
        || lowered.contains("invalid key")
        || lowered.contains("authentication");
    let mentions_endpoint = lowered.contains("endpoint")
        || lowered.contains("resource not found")
        || lowered.contains("no route");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN if mentions_endpoint && !mentions_key => {
            ProviderError::Endpoint { status: code, detail }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth { status: code, detail },
        StatusCode::NOT_FOUND => ProviderError::Endpoint { status: code, detail },
        _ if mentions_key => ProviderError::Auth { status: code, detail },
        _ => ProviderError::Status { status: code, detail },
    }
}

/// Pass successful responses through, classify everything else.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_failure(status, &body))
}

/// Join a configured base endpoint with an API path.
pub(crate) fn join_endpoint(endpoint: &str, path: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'))
}
