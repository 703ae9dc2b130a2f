//! The job pipeline: store → signed reference → OCR → language detection →
//! translation → text analytics → classification.
//!
//! Only the store and a failing configured OCR call abort a job. Every other
//! stage records its failure in the trace and continues with a safe default.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use crate::models::pipeline::{PipelineResult, StepName, StepRecord, StepStatus};
use crate::services::heuristics::{self, CATEGORIES, PLACEHOLDER_OCR_TEXT};
use crate::services::providers::{ProviderError, Providers};
use crate::services::storage::{ArtifactRef, ArtifactStore, StorageError};

/// An upload spooled to local disk, waiting to be processed.
#[derive(Debug, Clone)]
pub struct StagedArtifact {
    pub job_id: Uuid,
    pub path: PathBuf,
    /// Name the artifact is stored under (`<job id><ext>`).
    pub stored_name: String,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub target_language: String,
    pub sas_expiry: Duration,
    pub stage_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            target_language: "es".to_string(),
            sas_expiry: Duration::from_secs(3600),
            stage_timeout: Duration::from_secs(30),
        }
    }
}

/// Errors that abort a job.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to read staged upload {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storing the artifact failed: {0}")]
    Storage(#[source] StorageError),

    #[error("OCR failed: {0}")]
    Ocr(#[source] ProviderError),

    #[error("Job exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Pipeline panicked: {0}")]
    Panicked(String),
}

/// A fatal error together with the trace recorded up to the failure.
#[derive(Debug)]
pub struct PipelineFailure {
    pub error: PipelineError,
    pub steps: Vec<StepRecord>,
}

/// Step trace for one job; logs each outcome as it is appended. The steps
/// live with the caller so they outlast a cancelled or panicking run.
struct Trace<'a> {
    job_id: Uuid,
    steps: &'a mut Vec<StepRecord>,
}

impl<'a> Trace<'a> {
    fn new(job_id: Uuid, steps: &'a mut Vec<StepRecord>) -> Self {
        Self { job_id, steps }
    }

    fn record(&mut self, step: StepRecord) {
        match step.status {
            StepStatus::Done => {
                tracing::info!(job_id = %self.job_id, step = %step.name, info = %step.info, "Step done")
            }
            StepStatus::Warning | StepStatus::Error => {
                tracing::warn!(
                    job_id = %self.job_id,
                    step = %step.name,
                    status = %step.status,
                    info = %step.info,
                    "Step degraded"
                );
                metrics::counter!("pipeline_steps_degraded_total", "step" => step.name.to_string())
                    .increment(1);
            }
        }
        self.steps.push(step);
    }
}

pub struct Pipeline {
    storage: Arc<dyn ArtifactStore>,
    providers: Providers,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(storage: Arc<dyn ArtifactStore>, providers: Providers, settings: PipelineSettings) -> Self {
        Self {
            storage,
            providers,
            settings,
        }
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn storage_backend(&self) -> &'static str {
        self.storage.backend()
    }

    /// Bound one external call by the per-stage timeout.
    async fn bounded<T, E>(
        &self,
        call: impl Future<Output = Result<T, E>>,
        on_timeout: fn(Duration) -> E,
    ) -> Result<T, E> {
        match tokio::time::timeout(self.settings.stage_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(on_timeout(self.settings.stage_timeout)),
        }
    }

    /// Drive one artifact through every stage.
    pub async fn run(&self, artifact: &StagedArtifact) -> Result<PipelineResult, PipelineFailure> {
        let mut steps = Vec::with_capacity(7);
        match self.run_traced(artifact, &mut steps).await {
            Ok(mut result) => {
                result.steps = steps;
                Ok(result)
            }
            Err(error) => Err(PipelineFailure { error, steps }),
        }
    }

    /// Like [`Pipeline::run`], but appends each step to `steps` as it
    /// completes. The returned result carries no steps; they stay in `steps`.
    #[tracing::instrument(skip_all, fields(job_id = %artifact.job_id))]
    pub async fn run_traced(
        &self,
        artifact: &StagedArtifact,
        steps: &mut Vec<StepRecord>,
    ) -> Result<PipelineResult, PipelineError> {
        let mut trace = Trace::new(artifact.job_id, steps);
        let mut result = PipelineResult::new(artifact.job_id, &artifact.stored_name);

        // ── Store (fatal) ────────────────────────────────────────────────
        let raw_ref = match self.store(artifact).await {
            Ok((reference, bytes)) => {
                trace.record(StepRecord::done(
                    StepName::Upload,
                    json!({
                        "filename": artifact.stored_name,
                        "bytes": bytes,
                        "backend": self.storage.backend(),
                        "location": reference.to_string(),
                    }),
                ));
                reference
            }
            Err(e) => {
                trace.record(StepRecord::error(StepName::Upload, json!({ "error": e.to_string() })));
                return Err(e);
            }
        };

        // ── Signed reference (degraded) ──────────────────────────────────
        let reference = match self
            .bounded(
                self.storage.signed_url(&artifact.stored_name, self.settings.sas_expiry),
                StorageError::Timeout,
            )
            .await
        {
            Ok(url) => {
                trace.record(StepRecord::done(
                    StepName::GenerateSas,
                    json!({ "expiresInSecs": self.settings.sas_expiry.as_secs() }),
                ));
                result.artifact_url = Some(url.clone());
                ArtifactRef::Url(url)
            }
            Err(e) => {
                trace.record(StepRecord::warning(
                    StepName::GenerateSas,
                    json!({ "error": e.to_string(), "fallback": raw_ref.to_string() }),
                ));
                raw_ref
            }
        };

        // ── OCR (fatal when configured) ──────────────────────────────────
        let extracted = match self.providers.ocr.configured() {
            None => {
                trace.record(StepRecord::done(
                    StepName::Ocr,
                    json!({ "note": "Placeholder OCR text used (no OCR provider configured)" }),
                ));
                PLACEHOLDER_OCR_TEXT.to_string()
            }
            Some(ocr) => match self.bounded(ocr.analyze(&reference), ProviderError::Timeout).await {
                Ok(text) => {
                    trace.record(StepRecord::done(
                        StepName::Ocr,
                        json!({ "chars": text.chars().count() }),
                    ));
                    text
                }
                Err(e) => {
                    trace.record(StepRecord::error(StepName::Ocr, json!({ "error": e.to_string() })));
                    return Err(PipelineError::Ocr(e));
                }
            },
        };

        // ── Language detection (degraded) ────────────────────────────────
        let detected = self.detect_language(&extracted, &mut trace).await;

        // ── Translation (conditional, degraded) ──────────────────────────
        let target = self.settings.target_language.as_str();
        let mut translated = extracted.clone();
        let mut text_language = detected.clone();
        match self.providers.translator.configured() {
            Some(translator) if detected != target => {
                match self
                    .bounded(translator.translate(&extracted, target), ProviderError::Timeout)
                    .await
                {
                    Ok(text) => {
                        trace.record(StepRecord::done(
                            StepName::Translate,
                            json!({ "from": detected, "to": target }),
                        ));
                        translated = text;
                        text_language = target.to_string();
                    }
                    Err(e) => trace.record(StepRecord::error(
                        StepName::Translate,
                        json!({ "error": e.to_string(), "note": "Kept untranslated text" }),
                    )),
                }
            }
            _ => trace.record(StepRecord::done(
                StepName::Translate,
                json!({ "note": "No translation required or translator not configured" }),
            )),
        }

        // ── Text analytics (degraded) ────────────────────────────────────
        let language_hint = (text_language != "unknown").then_some(text_language.as_str());
        let insights = match self.providers.analyzer.configured() {
            Some(analyzer) => match self
                .bounded(analyzer.analyze_text(&translated, language_hint), ProviderError::Timeout)
                .await
            {
                Ok(insights) => {
                    trace.record(StepRecord::done(
                        StepName::TextAnalytics,
                        json!({
                            "keyPhrases": insights.key_phrases.len(),
                            "sentiment": insights.sentiment,
                        }),
                    ));
                    Some(insights)
                }
                Err(e) => {
                    trace.record(StepRecord::error(
                        StepName::TextAnalytics,
                        json!({ "error": e.to_string() }),
                    ));
                    None
                }
            },
            None => {
                trace.record(StepRecord::done(
                    StepName::TextAnalytics,
                    json!({ "note": "Basic local keywords & neutral sentiment used" }),
                ));
                Some(heuristics::analyze_text(&translated))
            }
        };
        if let Some(insights) = insights {
            result.key_phrases = insights.key_phrases;
            result.sentiment = insights.sentiment;
        }

        // ── Classification (never fatal) ─────────────────────────────────
        let classification = match self.providers.classifier.configured() {
            Some(classifier) => match self
                .bounded(classifier.classify(&translated, CATEGORIES), ProviderError::Timeout)
                .await
            {
                Ok(c) if !c.label.trim().is_empty() => {
                    trace.record(StepRecord::done(
                        StepName::Classification,
                        json!({ "classification": c.label, "source": "provider", "confidence": c.confidence }),
                    ));
                    c.label
                }
                outcome => {
                    let error = match outcome {
                        Err(e) => e.to_string(),
                        Ok(_) => "provider returned an empty label".to_string(),
                    };
                    let fallback = heuristics::classify_by_keywords(&result.key_phrases);
                    trace.record(StepRecord::warning(
                        StepName::Classification,
                        json!({ "classification": fallback.label, "source": "keywords", "error": error }),
                    ));
                    fallback.label
                }
            },
            None => {
                let fallback = heuristics::classify_by_keywords(&result.key_phrases);
                trace.record(StepRecord::done(
                    StepName::Classification,
                    json!({ "classification": fallback.label, "source": "keywords" }),
                ));
                fallback.label
            }
        };

        result.extracted_text = extracted;
        result.detected_language = detected;
        result.translated = translated;
        result.classification = classification;
        Ok(result)
    }

    async fn store(&self, artifact: &StagedArtifact) -> Result<(ArtifactRef, usize), PipelineError> {
        let data = tokio::fs::read(&artifact.path)
            .await
            .map_err(|source| PipelineError::Staging {
                path: artifact.path.clone(),
                source,
            })?;

        let reference = self
            .bounded(
                self.storage
                    .put(&artifact.stored_name, &data, &artifact.content_type),
                StorageError::Timeout,
            )
            .await
            .map_err(PipelineError::Storage)?;

        Ok((reference, data.len()))
    }

    async fn detect_language(&self, text: &str, trace: &mut Trace<'_>) -> String {
        let Some(detector) = self.providers.language.configured() else {
            let language = heuristics::detect_language(text);
            trace.record(StepRecord::done(
                StepName::LanguageDetection,
                json!({ "language": language, "source": "heuristic" }),
            ));
            return language.to_string();
        };

        match self
            .bounded(detector.detect_language(text), ProviderError::Timeout)
            .await
        {
            Ok(Some(language)) => {
                trace.record(StepRecord::done(
                    StepName::LanguageDetection,
                    json!({ "language": language, "source": "provider" }),
                ));
                language
            }
            Ok(None) => {
                let language = heuristics::detect_language(text);
                trace.record(StepRecord::done(
                    StepName::LanguageDetection,
                    json!({
                        "language": language,
                        "source": "heuristic",
                        "note": "Provider could not determine the language",
                    }),
                ));
                language.to_string()
            }
            Err(e) => {
                let language = heuristics::detect_language(text);
                trace.record(StepRecord::error(
                    StepName::LanguageDetection,
                    json!({ "error": e.to_string(), "fallback": language }),
                ));
                language.to_string()
            }
        }
    }
}
