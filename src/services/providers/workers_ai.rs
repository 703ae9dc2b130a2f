use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ensure_success, Classifier, ProviderError};
use crate::models::pipeline::Classification;

const CLASSIFY_MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";

/// Classifier backed by a Cloudflare Workers AI text-generation model.
pub struct WorkersAiClassifier {
    http: Client,
    account_id: String,
    api_token: String,
}

#[derive(Deserialize)]
struct RunResponse {
    result: Option<RunResult>,
}

#[derive(Deserialize)]
struct RunResult {
    #[serde(default)]
    response: String,
}

impl WorkersAiClassifier {
    pub fn new(http: Client, account_id: &str, api_token: &str) -> Self {
        Self {
            http,
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
        }
    }
}

/// Map a free-text model reply onto one of `categories`.
fn match_category(reply: &str, categories: &[&str]) -> Option<Classification> {
    let reply = reply.trim().trim_matches(|c: char| c == '"' || c == '.').to_lowercase();
    if let Some(exact) = categories.iter().find(|c| c.to_lowercase() == reply) {
        return Some(Classification {
            label: exact.to_string(),
            confidence: Some(1.0),
        });
    }
    categories
        .iter()
        .find(|c| reply.contains(&c.to_lowercase()))
        .map(|c| Classification {
            label: c.to_string(),
            confidence: None,
        })
}

#[async_trait]
impl Classifier for WorkersAiClassifier {
    async fn classify(
        &self,
        text: &str,
        categories: &[&str],
    ) -> Result<Classification, ProviderError> {
        let url = format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/{}",
            self.account_id, CLASSIFY_MODEL
        );

        let prompt = format!(
            "Classify the following document text into exactly one of these categories: {}. \
             Reply with the category name only.\n\nText:\n{}",
            categories.join(", "),
            text
        );

        let request_body = serde_json::json!({
            "prompt": prompt,
            "max_tokens": 16
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await?;

        let run: RunResponse = ensure_success(response).await?.json().await?;
        let reply = run.result.map(|r| r.response).unwrap_or_default();

        match_category(&reply, categories).ok_or_else(|| {
            ProviderError::MalformedResponse(format!("reply named no known category: {reply:?}"))
        })
    }
}
