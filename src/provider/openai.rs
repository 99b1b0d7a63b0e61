//! OpenAI-compatible chat completions adapter
//!
//! Serves ChatGPT, Gemini's compatibility endpoint, and local servers such as
//! LM Studio or llama.cpp.

use super::client::http_client;
use super::{Provider, ProviderConfig, ProviderKind, ProviderResponse, QueryContext};
use crate::error::ProviderError;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse,
    },
    Client,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::time::{Duration, Instant};

pub struct OpenAiProvider {
    config: ProviderConfig,
    api_key: Option<String>,
    client: Client<OpenAIConfig>,
    /// Only used for the `/models` health check
    http: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(
        config: ProviderConfig,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = http_client(timeout)?;
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key.clone().unwrap_or_default())
            .with_api_base(&config.base_url);
        let client = Client::with_config(openai_config).with_http_client(http.clone());

        Ok(Self {
            config,
            api_key,
            client,
            http,
        })
    }

    fn messages(
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Vec<ChatCompletionRequestMessage>, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?
                    .into(),
            );
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into(),
        );
        Ok(messages)
    }
}

/// Map a chat completion onto a [`ProviderResponse`]; the first choice wins
fn to_response(
    config: &ProviderConfig,
    parsed: CreateChatCompletionResponse,
    elapsed: Duration,
) -> Result<ProviderResponse, ProviderError> {
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Decode("response contained no choices".to_string()))?;
    let (input, output) = parsed
        .usage
        .map(|u| (u64::from(u.prompt_tokens), u64::from(u.completion_tokens)))
        .unwrap_or_default();

    Ok(ProviderResponse {
        provider: config.id.clone(),
        content: choice.message.content.unwrap_or_default(),
        confidence: config.confidence,
        processing_time_secs: elapsed.as_secs_f64(),
        tokens_used: input + output,
        cost: config.cost(input, output),
        metadata: json!({
            "model": parsed.model,
            "finishReason": choice.finish_reason,
        }),
        timestamp: Utc::now(),
    })
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn display_name(&self) -> &str {
        self.config.display_name()
    }

    #[allow(deprecated)]
    async fn query(
        &self,
        prompt: &str,
        ctx: &QueryContext,
        system_prompt: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let start = Instant::now();

        // max_tokens rather than max_completion_tokens: compatible servers only know the former
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages(Self::messages(prompt, system_prompt)?)
            .max_tokens(ctx.max_tokens.unwrap_or(self.config.max_tokens))
            .temperature(ctx.temperature.unwrap_or(self.config.temperature))
            .build()?;

        let parsed = self.client.chat().create(request).await?;
        let response = to_response(&self.config, parsed, start.elapsed())?;

        tracing::info!(
            target: "llm",
            provider = %self.config.id,
            model = %self.config.model,
            elapsed_ms = (response.processing_time_secs * 1000.0) as u64,
            tokens = response.tokens_used,
            "chat completion complete"
        );
        Ok(response)
    }

    async fn health_check(&self) -> bool {
        let mut request = self.http.get(format!("{}/models", self.config.base_url));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = %self.config.id, error = %e, "health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(choices: &str, usage: &str) -> CreateChatCompletionResponse {
        serde_json::from_str(&format!(
            r#"{{
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 1700000000,
                "model": "gpt-4o",
                "choices": {choices},
                "usage": {usage}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_first_choice_and_usage_are_mapped() {
        let parsed = completion(
            r#"[
                {"index": 0, "message": {"role": "assistant", "content": "pattern found"}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "ignored"}, "finish_reason": "stop"}
            ]"#,
            r#"{"prompt_tokens": 1000, "completion_tokens": 1000, "total_tokens": 2000}"#,
        );
        let config = ProviderConfig::chatgpt();

        let response = to_response(&config, parsed, Duration::from_millis(250)).unwrap();

        assert_eq!(response.provider, "chatgpt");
        assert_eq!(response.content, "pattern found");
        assert_eq!(response.tokens_used, 2000);
        assert!((response.cost - config.cost(1000, 1000)).abs() < 1e-9);
        assert!((response.processing_time_secs - 0.25).abs() < 1e-9);
        assert_eq!(response.metadata["finishReason"], "stop");
    }

    #[test]
    fn test_no_choices_is_a_decode_error() {
        let parsed = completion("[]", "null");

        let err = to_response(&ProviderConfig::chatgpt(), parsed, Duration::ZERO).unwrap_err();

        assert!(matches!(err, ProviderError::Decode(ref msg) if msg.contains("no choices")));
    }

    #[test]
    fn test_missing_usage_costs_nothing() {
        let parsed = completion(
            r#"[{"index": 0, "message": {"role": "assistant", "content": null}, "finish_reason": "length"}]"#,
            "null",
        );

        let response = to_response(&ProviderConfig::chatgpt(), parsed, Duration::ZERO).unwrap();

        assert_eq!(response.content, "");
        assert_eq!(response.tokens_used, 0);
        assert_eq!(response.cost, 0.0);
    }
}
