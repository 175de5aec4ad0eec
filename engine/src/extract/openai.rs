use async_trait::async_trait;
use reqwest::Client;
use sdk::errors::BoardError;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{validate_extraction, Extraction, Extractor};
use crate::config::ExtractionConfig;
use crate::retry::{with_retry, RetryPolicy};
use crate::secrets::{scrub, SecretString};

const SYSTEM_PROMPT: &str = "You read meeting notes and reply with a JSON object \
{\"insights\": [string], \"risks\": [string]}. Each entry is one short, \
self-contained sentence. Reply with the JSON object only.";

/// Chat-completions extraction provider
pub struct OpenAIExtractor {
    config: ExtractionConfig,
    api_key: SecretString,
    policy: RetryPolicy,
    client: Client,
}

impl OpenAIExtractor {
    pub fn new(
        config: ExtractionConfig,
        api_key: SecretString,
        policy: RetryPolicy,
    ) -> Result<Self, BoardError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BoardError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            api_key,
            policy,
            client,
        })
    }

    async fn complete(&self, source: &str) -> Result<String, BoardError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let payload = json!({
            "model": self.config.model,
            "temperature": 0.2,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": source },
            ],
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key.unsecure()))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| BoardError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BoardError::from_status(status.as_u16(), scrub(&text)));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| BoardError::Extraction(format!("Unexpected response body: {}", e)))?;

        data.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BoardError::Extraction("No message content in response".to_string()))
    }
}

#[async_trait]
impl Extractor for OpenAIExtractor {
    fn name(&self) -> &str {
        "openai"
    }

    async fn extract(&self, source: &str) -> Result<Extraction, BoardError> {
        let content = with_retry(&self.policy, "extraction", || self.complete(source)).await?;
        debug!(chars = content.len(), "Extraction response received");

        let value: Value = serde_json::from_str(strip_code_fence(&content)).map_err(|e| {
            BoardError::Validation(format!("extraction output is not JSON: {}", e))
        })?;
        validate_extraction(&value, self.config.max_items_per_category)
    }
}

/// Body of a fenced code block, or the trimmed text itself.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}
