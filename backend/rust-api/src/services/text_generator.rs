//! Client for the optional text-generation collaborator.
//!
//! Replies are opaque text. Callers extract and validate whatever structure
//! they need and fall back to fixed data on any failure.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::TextApiConfig;
use crate::error::ProgressionError;
use crate::metrics::TEXT_GENERATION_REQUESTS_TOTAL;

lazy_static! {
    static ref JSON_ARRAY: Regex = Regex::new(r"(?s)\[.*\]").unwrap();
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// One bounded completion round. Errors are `ExternalService`.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProgressionError>;
}

/// OpenAI-compatible `/v1/chat/completions` client.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    config: TextApiConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: TextApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build text generation HTTP client")?;
        Ok(Self { http, config })
    }

    async fn request(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        let url = format!("{}/v1/chat/completions", self.config.url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
            "temperature": 0.7,
            "max_tokens": 2000,
        });

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.config.key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("Text generation request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP {} from text generation API", response.status()));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .context("Text generation reply is not JSON")?;

        payload
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Text generation reply has no message content"))
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProgressionError> {
        let bound = Duration::from_secs(self.config.timeout_secs);
        let outcome = tokio::time::timeout(bound, self.request(system, prompt)).await;

        let status = match &outcome {
            Ok(Ok(_)) => "success",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        TEXT_GENERATION_REQUESTS_TOTAL
            .with_label_values(&[status])
            .inc();

        match outcome {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(ProgressionError::ExternalService(format!("{:#}", e))),
            Err(_) => Err(ProgressionError::ExternalService(format!(
                "text generation timed out after {}s",
                self.config.timeout_secs
            ))),
        }
    }
}

/// Deserializes the first JSON array embedded in `text`.
pub fn extract_array<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, ProgressionError> {
    let raw = JSON_ARRAY
        .find(text)
        .ok_or_else(|| ProgressionError::ExternalService("no JSON array in reply".to_string()))?;
    serde_json::from_str(raw.as_str())
        .map_err(|e| ProgressionError::ExternalService(format!("malformed JSON array: {}", e)))
}

/// Deserializes the first JSON object embedded in `text`.
pub fn extract_object<T: DeserializeOwned>(text: &str) -> Result<T, ProgressionError> {
    let raw = JSON_OBJECT
        .find(text)
        .ok_or_else(|| ProgressionError::ExternalService("no JSON object in reply".to_string()))?;
    serde_json::from_str(raw.as_str())
        .map_err(|e| ProgressionError::ExternalService(format!("malformed JSON object: {}", e)))
}
