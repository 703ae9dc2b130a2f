use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub pending_jobs: usize,
    pub providers: ProviderHealth,
}

/// Which capability providers are live; absent ones run on local fallbacks.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub ocr: bool,
    pub language_detection: bool,
    pub translation: bool,
    pub text_analytics: bool,
    pub classification: bool,
    /// S3-compatible storage; `false` means artifacts stay on local disk.
    pub object_storage: bool,
}

/// GET /health: liveness plus the resolved provider configuration.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let pipeline = state.runner.pipeline();
    let providers = pipeline.providers();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pending_jobs: state.jobs.pending_count().await,
        providers: ProviderHealth {
            ocr: providers.ocr.is_configured(),
            language_detection: providers.language.is_configured(),
            translation: providers.translator.is_configured(),
            text_analytics: providers.analyzer.is_configured(),
            classification: providers.classifier.is_configured(),
            object_storage: pipeline.storage_backend() == "s3",
        },
    })
}
