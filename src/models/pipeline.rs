use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Sentiment reported when no analysis ran or it failed.
pub const DEFAULT_SENTIMENT: &str = "neutral";

/// Classification reported when no category rule matched.
pub const DEFAULT_CLASSIFICATION: &str = "General";

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
pub enum StepName {
    #[serde(rename = "upload")]
    #[strum(serialize = "upload")]
    Upload,
    #[serde(rename = "generateSAS")]
    #[strum(serialize = "generateSAS")]
    GenerateSas,
    #[serde(rename = "ocr")]
    #[strum(serialize = "ocr")]
    Ocr,
    #[serde(rename = "languageDetection")]
    #[strum(serialize = "languageDetection")]
    LanguageDetection,
    #[serde(rename = "translate")]
    #[strum(serialize = "translate")]
    Translate,
    #[serde(rename = "textAnalytics")]
    #[strum(serialize = "textAnalytics")]
    TextAnalytics,
    #[serde(rename = "classification")]
    #[strum(serialize = "classification")]
    Classification,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepStatus {
    Done,
    Warning,
    Error,
}

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    #[serde(rename = "step")]
    pub name: StepName,
    pub status: StepStatus,
    /// Free-form diagnostics: notes, counts, errors.
    pub info: serde_json::Value,
}

impl StepRecord {
    pub fn done(name: StepName, info: serde_json::Value) -> Self {
        Self {
            name,
            status: StepStatus::Done,
            info,
        }
    }

    pub fn warning(name: StepName, info: serde_json::Value) -> Self {
        Self {
            name,
            status: StepStatus::Warning,
            info,
        }
    }

    pub fn error(name: StepName, info: serde_json::Value) -> Self {
        Self {
            name,
            status: StepStatus::Error,
            info,
        }
    }
}

/// Final payload of a successful job. Every field has a usable default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub id: Uuid,
    pub filename: String,
    pub extracted_text: String,
    pub detected_language: String,
    pub translated: String,
    pub key_phrases: Vec<String>,
    pub sentiment: String,
    pub classification: String,
    pub steps: Vec<StepRecord>,
    /// Time-bounded read URL to the stored artifact, when one could be issued.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub artifact_url: Option<String>,
}

impl PipelineResult {
    pub fn new(id: Uuid, filename: impl Into<String>) -> Self {
        Self {
            id,
            filename: filename.into(),
            extracted_text: String::new(),
            detected_language: "unknown".to_string(),
            translated: String::new(),
            key_phrases: Vec::new(),
            sentiment: DEFAULT_SENTIMENT.to_string(),
            classification: DEFAULT_CLASSIFICATION.to_string(),
            steps: Vec::new(),
            artifact_url: None,
        }
    }
}

/// Key phrases and sentiment for a body of text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextInsights {
    pub sentiment: String,
    pub key_phrases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: Option<f64>,
}
