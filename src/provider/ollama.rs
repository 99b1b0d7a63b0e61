//! Ollama adapter for locally served models

use super::client::{check_status, http_client};
use super::{Provider, ProviderConfig, ProviderKind, ProviderResponse, QueryContext};
use crate::error::ProviderError;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

/// Local generations are never billed
fn to_response(
    config: &ProviderConfig,
    parsed: GenerateResponse,
    elapsed: Duration,
) -> ProviderResponse {
    ProviderResponse {
        provider: config.id.clone(),
        content: parsed.response,
        confidence: config.confidence,
        processing_time_secs: elapsed.as_secs_f64(),
        tokens_used: parsed.prompt_eval_count + parsed.eval_count,
        cost: 0.0,
        metadata: json!({"model": config.model, "local": true}),
        timestamp: Utc::now(),
    }
}

pub struct OllamaProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            config,
            http: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
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
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": ctx.temperature.unwrap_or(self.config.temperature),
                "num_predict": ctx.max_tokens.unwrap_or(self.config.max_tokens),
            },
        });
        if let Some(system) = system_prompt {
            body["system"] = json!(system);
        }

        let response = self
            .http
            .post(format!("{}/api/generate", self.config.base_url))
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let parsed: GenerateResponse = response
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
            "ollama generate complete"
        );
        Ok(response)
    }

    async fn health_check(&self) -> bool {
        match self
            .http
            .get(format!("{}/api/tags", self.config.base_url))
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::debug!(provider = %self.config.id, error = %e, "health check failed");
                false
            }
        }
    }
}
