//! Gemini summarization and keyword extraction.
//!
//! Two `generateContent` calls per request: the summary model condenses the
//! input, then the keyword model pulls keywords out of that summary.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::SummarizerConfig;

const SUMMARY_PROMPT: &str = "Summarize this text: {text}";

const KEYWORDS_PROMPT: &str =
    "Extract the most important keywords from the following text:\n\n{text}";

/// Summary and keyword text for one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub summary: String,
    pub keywords: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("Gemini request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Gemini returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Gemini response had no text")]
    EmptyResponse,
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

/// Produces a summary and keywords for free text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<Summary, SummarizeError>;
}

pub struct GeminiSummarizer {
    api_key: String,
    base_url: String,
    summary_model: String,
    keyword_model: String,
    client: Client,
}

impl GeminiSummarizer {
    pub fn new(config: &SummarizerConfig, api_key: String) -> Result<Self, SummarizeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(SummarizeError::Client)?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            summary_model: config.summary_model.clone(),
            keyword_model: config.keyword_model.clone(),
            client,
        })
    }

    /// Run one prompt through `model` and return its text.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, SummarizeError> {
        let url = format!("{}/v1beta/models/{model}:generateContent", self.base_url);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Gemini model {model} returned status {status}");
            return Err(SummarizeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = resp.json().await?;
        let text = response_text(&data);
        if text.trim().is_empty() {
            return Err(SummarizeError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, text: &str) -> Result<Summary, SummarizeError> {
        let t_start = Instant::now();

        debug!("Generating summary with {}", self.summary_model);
        let summary = self
            .generate(&self.summary_model, &SUMMARY_PROMPT.replace("{text}", text))
            .await?;

        debug!("Extracting keywords with {}", self.keyword_model);
        let keywords = self
            .generate(&self.keyword_model, &KEYWORDS_PROMPT.replace("{text}", &summary))
            .await?;

        let latency_ms = t_start.elapsed().as_secs_f64() * 1000.0;
        info!(
            "Summarized {} chars → {} chars, {} chars of keywords ({latency_ms:.0}ms)",
            text.len(),
            summary.len(),
            keywords.len()
        );

        Ok(Summary { summary, keywords })
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(data: &Value) -> String {
    data["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}
