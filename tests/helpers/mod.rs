//! Test doubles for capability providers and storage.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use image_insight::models::pipeline::{Classification, TextInsights};
use image_insight::services::pipeline::{Pipeline, PipelineSettings, StagedArtifact};
use image_insight::services::providers::{
    Classifier, LanguageDetector, OcrProvider, ProviderError, Providers, TextAnalyzer,
    Translator,
};
use image_insight::services::storage::{ArtifactRef, ArtifactStore, LocalStorage, StorageError};

pub fn provider_down() -> ProviderError {
    ProviderError::Status {
        status: 503,
        detail: "service unavailable".to_string(),
    }
}

// ── OCR ─────────────────────────────────────────────────────────────────

/// Returns fixed text and remembers the reference it was given.
pub struct FixedOcr {
    pub text: String,
    pub seen: Mutex<Option<ArtifactRef>>,
}

impl FixedOcr {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            seen: Mutex::new(None),
        })
    }
}

#[async_trait]
impl OcrProvider for FixedOcr {
    async fn analyze(&self, artifact: &ArtifactRef) -> Result<String, ProviderError> {
        *self.seen.lock().unwrap() = Some(artifact.clone());
        Ok(self.text.clone())
    }
}

pub struct FailingOcr;

#[async_trait]
impl OcrProvider for FailingOcr {
    async fn analyze(&self, _artifact: &ArtifactRef) -> Result<String, ProviderError> {
        Err(ProviderError::Auth {
            status: 401,
            detail: "invalid subscription key".to_string(),
        })
    }
}

pub struct SlowOcr(pub Duration);

#[async_trait]
impl OcrProvider for SlowOcr {
    async fn analyze(&self, _artifact: &ArtifactRef) -> Result<String, ProviderError> {
        tokio::time::sleep(self.0).await;
        Ok("too late".to_string())
    }
}

pub struct PanickingOcr;

#[async_trait]
impl OcrProvider for PanickingOcr {
    async fn analyze(&self, _artifact: &ArtifactRef) -> Result<String, ProviderError> {
        panic!("ocr client bug");
    }
}

// ── Language detection ──────────────────────────────────────────────────

pub struct FixedLanguage(pub &'static str);

#[async_trait]
impl LanguageDetector for FixedLanguage {
    async fn detect_language(&self, _text: &str) -> Result<Option<String>, ProviderError> {
        Ok(Some(self.0.to_string()))
    }
}

/// Answers without a language, as the service does for unreadable text.
pub struct SilentLanguage;

#[async_trait]
impl LanguageDetector for SilentLanguage {
    async fn detect_language(&self, _text: &str) -> Result<Option<String>, ProviderError> {
        Ok(None)
    }
}

pub struct FailingLanguage;

#[async_trait]
impl LanguageDetector for FailingLanguage {
    async fn detect_language(&self, _text: &str) -> Result<Option<String>, ProviderError> {
        Err(provider_down())
    }
}

// ── Translation ─────────────────────────────────────────────────────────

/// Counts calls; prefixes the text, or fails when `fail` is set.
pub struct CountingTranslator {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl CountingTranslator {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for CountingTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(provider_down());
        }
        Ok(format!("[{target_lang}] {text}"))
    }
}

// ── Text analytics ──────────────────────────────────────────────────────

pub struct FixedAnalyzer(pub Vec<&'static str>);

#[async_trait]
impl TextAnalyzer for FixedAnalyzer {
    async fn analyze_text(
        &self,
        _text: &str,
        _language: Option<&str>,
    ) -> Result<TextInsights, ProviderError> {
        Ok(TextInsights {
            sentiment: "positive".to_string(),
            key_phrases: self.0.iter().map(|p| p.to_string()).collect(),
        })
    }
}

pub struct FailingAnalyzer;

#[async_trait]
impl TextAnalyzer for FailingAnalyzer {
    async fn analyze_text(
        &self,
        _text: &str,
        _language: Option<&str>,
    ) -> Result<TextInsights, ProviderError> {
        Err(provider_down())
    }
}

// ── Classification ──────────────────────────────────────────────────────

pub struct FixedClassifier(pub &'static str);

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(
        &self,
        _text: &str,
        _categories: &[&str],
    ) -> Result<Classification, ProviderError> {
        Ok(Classification {
            label: self.0.to_string(),
            confidence: Some(0.9),
        })
    }
}

pub struct FailingClassifier;

#[async_trait]
impl Classifier for FailingClassifier {
    async fn classify(
        &self,
        _text: &str,
        _categories: &[&str],
    ) -> Result<Classification, ProviderError> {
        Err(ProviderError::MalformedResponse("garbage".to_string()))
    }
}

// ── Storage ─────────────────────────────────────────────────────────────

/// Local storage that can also "sign" URLs.
pub struct SigningStorage {
    inner: LocalStorage,
}

impl SigningStorage {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: LocalStorage::new(root),
        }
    }
}

#[async_trait]
impl ArtifactStore for SigningStorage {
    async fn put(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<ArtifactRef, StorageError> {
        self.inner.put(key, data, content_type).await
    }

    async fn signed_url(&self, key: &str, expiry: Duration) -> Result<String, StorageError> {
        Ok(format!(
            "https://storage.test/{key}?se={}&sig=abc",
            expiry.as_secs()
        ))
    }

    fn backend(&self) -> &'static str {
        "signing-test"
    }
}

pub struct BrokenStorage;

#[async_trait]
impl ArtifactStore for BrokenStorage {
    async fn put(
        &self,
        _key: &str,
        _data: &[u8],
        _content_type: &str,
    ) -> Result<ArtifactRef, StorageError> {
        Err(StorageError::Rejected(403))
    }

    async fn signed_url(&self, _key: &str, _expiry: Duration) -> Result<String, StorageError> {
        Err(StorageError::Rejected(403))
    }

    fn backend(&self) -> &'static str {
        "broken"
    }
}

// ── Wiring ──────────────────────────────────────────────────────────────

/// Write `data` to a staging file in `dir` and describe it as a job artifact.
pub fn stage(dir: &Path, data: &[u8]) -> StagedArtifact {
    let job_id = Uuid::new_v4();
    let stored_name = format!("{job_id}.png");
    let path = dir.join(&stored_name);
    std::fs::write(&path, data).expect("write staged upload");
    StagedArtifact {
        job_id,
        path,
        stored_name,
        content_type: "image/png".to_string(),
    }
}

pub fn local_pipeline(storage_dir: &Path, providers: Providers) -> Pipeline {
    Pipeline::new(
        Arc::new(LocalStorage::new(storage_dir)),
        providers,
        PipelineSettings::default(),
    )
}
