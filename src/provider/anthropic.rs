//! Anthropic Messages API adapter

use super::client::{check_status, http_client};
use super::{Provider, ProviderConfig, ProviderKind, ProviderResponse, QueryContext};
use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
    #[serde(default)]
    stop_reason: Option<String>,
}

/// Text blocks are concatenated in order; non-text blocks are skipped
fn to_response(
    config: &ProviderConfig,
    parsed: MessagesResponse,
    elapsed: Duration,
) -> ProviderResponse {
    let content: String = parsed
        .content
        .iter()
        .filter_map(|block| block.text.as_deref())
        .collect();
    let (input, output) = parsed
        .usage
        .map(|u| (u.input_tokens, u.output_tokens))
        .unwrap_or_default();

    ProviderResponse {
        provider: config.id.clone(),
        content,
        confidence: config.confidence,
        processing_time_secs: elapsed.as_secs_f64(),
        tokens_used: input + output,
        cost: config.cost(input, output),
        metadata: json!({
            "model": config.model,
            "inputTokens": input,
            "outputTokens": output,
            "stopReason": parsed.stop_reason,
        }),
        timestamp: Utc::now(),
    }
}

pub struct AnthropicProvider {
    config: ProviderConfig,
    api_key: String,
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(
        config: ProviderConfig,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            config,
            api_key,
            http: http_client(timeout)?,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.config.base_url, path))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn display_name(&self) -> &str {
        self.config.display_name()
    }

    async fn query(
        &self,
        prompt: &str,
        ctx: &QueryContext,
        system_prompt: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let start = Instant::now();

        let mut body = json!({
            "model": self.config.model,
            "max_tokens": ctx.max_tokens.unwrap_or(self.config.max_tokens),
            "temperature": ctx.temperature.unwrap_or(self.config.temperature),
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(system) = system_prompt {
            body["system"] = json!(system);
        }

        let response = self
            .request(reqwest::Method::POST, "messages")
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let response = to_response(&self.config, parsed, start.elapsed());

        tracing::info!(
            target: "llm",
            provider = %self.config.id,
            model = %self.config.model,
            elapsed_ms = (response.processing_time_secs * 1000.0) as u64,
            tokens = response.tokens_used,
            "anthropic query complete"
        );
        Ok(response)
    }

    async fn health_check(&self) -> bool {
        match self.request(reqwest::Method::GET, "models").send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = %self.config.id, error = %e, "health check failed");
                false
            }
        }
    }
}
