//! Azure AI Services adapters: Computer Vision OCR, Language (Text Analytics)
//! and Translator, called over their REST APIs.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{
    ensure_success, join_endpoint, LanguageDetector, OcrProvider, ProviderError, TextAnalyzer,
    Translator,
};
use crate::models::pipeline::{TextInsights, DEFAULT_SENTIMENT};
use crate::services::storage::ArtifactRef;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const SUBSCRIPTION_REGION_HEADER: &str = "Ocp-Apim-Subscription-Region";

/// Client for the Computer Vision v3.2 OCR endpoint.
pub struct AzureVisionOcr {
    http: Client,
    endpoint: String,
    key: String,
}

#[derive(Debug, Default, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    regions: Vec<OcrRegion>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrRegion {
    #[serde(default)]
    lines: Vec<OcrLine>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrLine {
    #[serde(default)]
    words: Vec<OcrWord>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrWord {
    #[serde(default)]
    text: String,
}

impl OcrResponse {
    fn into_text(self) -> String {
        let lines: Vec<String> = self
            .regions
            .into_iter()
            .flat_map(|region| region.lines)
            .map(|line| {
                line.words
                    .into_iter()
                    .map(|w| w.text)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        lines.join("\n").trim().to_string()
    }
}

impl AzureVisionOcr {
    pub fn new(http: Client, endpoint: &str, key: &str) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl OcrProvider for AzureVisionOcr {
    async fn analyze(&self, artifact: &ArtifactRef) -> Result<String, ProviderError> {
        let url = join_endpoint(&self.endpoint, "vision/v3.2/ocr");
        let request = self
            .http
            .post(&url)
            .query(&[("language", "unk"), ("detectOrientation", "true")])
            .header(SUBSCRIPTION_KEY_HEADER, &self.key);

        // Local artifacts are not reachable by the service, so send the bytes.
        let request = match artifact {
            ArtifactRef::Url(image_url) => request.json(&json!({ "url": image_url })),
            ArtifactRef::File(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    ProviderError::MalformedResponse(format!(
                        "artifact {} unreadable: {}",
                        path.display(),
                        e
                    ))
                })?;
                request
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(bytes)
            }
        };

        let response = ensure_success(request.send().await?).await?;
        let body = response.text().await?;
        let parsed: OcrResponse = serde_json::from_str(&body).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "OCR response did not parse, treating as empty");
            OcrResponse::default()
        });
        Ok(parsed.into_text())
    }
}

/// Client for the Language service (Text Analytics v3.1): language
/// detection, sentiment and key phrases.
pub struct AzureLanguageClient {
    http: Client,
    endpoint: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct DocumentsResponse<T> {
    #[serde(default = "Vec::new")]
    documents: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LanguageDocument {
    detected_language: Option<DetectedLanguage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectedLanguage {
    iso6391_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentimentDocument {
    sentiment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyPhraseDocument {
    #[serde(default)]
    key_phrases: Vec<String>,
}

impl AzureLanguageClient {
    pub fn new(http: Client, endpoint: &str, key: &str) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            key: key.to_string(),
        }
    }

    async fn call<T>(&self, path: &str, payload: serde_json::Value) -> Result<Option<T>, ProviderError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = join_endpoint(&self.endpoint, path);
        let response = self
            .http
            .post(&url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.key)
            .json(&payload)
            .send()
            .await?;
        let body = ensure_success(response).await?.text().await?;

        match serde_json::from_str::<DocumentsResponse<T>>(&body) {
            Ok(parsed) => Ok(parsed.documents.into_iter().next()),
            Err(e) => {
                tracing::warn!(path, error = %e, "Language response did not parse, treating as empty");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl LanguageDetector for AzureLanguageClient {
    async fn detect_language(&self, text: &str) -> Result<Option<String>, ProviderError> {
        let payload = json!({ "documents": [{ "id": "1", "text": text }] });
        let document: Option<LanguageDocument> =
            self.call("text/analytics/v3.1/languages", payload).await?;

        Ok(document
            .and_then(|d| d.detected_language)
            .and_then(|l| l.iso6391_name)
            .filter(|code| !code.is_empty() && code != "(Unknown)"))
    }
}

#[async_trait]
impl TextAnalyzer for AzureLanguageClient {
    async fn analyze_text(
        &self,
        text: &str,
        language: Option<&str>,
    ) -> Result<TextInsights, ProviderError> {
        let mut document = json!({ "id": "1", "text": text });
        if let Some(lang) = language {
            document["language"] = json!(lang);
        }
        let payload = json!({ "documents": [document] });

        let sentiment: Option<SentimentDocument> = self
            .call("text/analytics/v3.1/sentiment", payload.clone())
            .await?;
        let phrases: Option<KeyPhraseDocument> =
            self.call("text/analytics/v3.1/keyPhrases", payload).await?;

        Ok(TextInsights {
            sentiment: sentiment
                .and_then(|d| d.sentiment)
                .unwrap_or_else(|| DEFAULT_SENTIMENT.to_string()),
            key_phrases: phrases.map(|d| d.key_phrases).unwrap_or_default(),
        })
    }
}

/// Client for Translator v3.0.
pub struct AzureTranslator {
    http: Client,
    endpoint: String,
    key: String,
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslationItem {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

impl AzureTranslator {
    pub fn new(http: Client, endpoint: &str, key: &str, region: Option<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
            key: key.to_string(),
            region,
        }
    }
}

#[async_trait]
impl Translator for AzureTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError> {
        let url = join_endpoint(&self.endpoint, "translate");
        let mut request = self
            .http
            .post(&url)
            .query(&[("api-version", "3.0"), ("to", target_lang)])
            .header(SUBSCRIPTION_KEY_HEADER, &self.key)
            .json(&json!([{ "Text": text }]));
        if let Some(region) = self.region.as_deref().filter(|r| !r.is_empty()) {
            request = request.header(SUBSCRIPTION_REGION_HEADER, region);
        }

        let body = ensure_success(request.send().await?).await?.text().await?;
        let items: Vec<TranslationItem> = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        items
            .into_iter()
            .next()
            .and_then(|item| item.translations.into_iter().next())
            .map(|t| t.text)
            .ok_or_else(|| ProviderError::MalformedResponse("no translation returned".to_string()))
    }
}
