//! Provider contract shared by every AI backend adapter
//!
//! An adapter turns `(prompt, context, system prompt)` into a [`ProviderResponse`]
//! and answers a lightweight health check. Routing, failover and metrics live in
//! [`super::ProviderRouter`].

use super::{AnthropicProvider, OllamaProvider, OpenAiProvider, ProviderConfig, ProviderKind};
use crate::auth::AuthConfig;
use crate::error::ProviderError;
use crate::task::Priority;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Query category used to pick a routing rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    Analysis,
    Generation,
    Reasoning,
    Creative,
    Technical,
    Investigation,
}

impl QueryCategory {
    pub const ALL: [QueryCategory; 6] = [
        QueryCategory::Analysis,
        QueryCategory::Generation,
        QueryCategory::Reasoning,
        QueryCategory::Creative,
        QueryCategory::Technical,
        QueryCategory::Investigation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryCategory::Analysis => "analysis",
            QueryCategory::Generation => "generation",
            QueryCategory::Reasoning => "reasoning",
            QueryCategory::Creative => "creative",
            QueryCategory::Technical => "technical",
            QueryCategory::Investigation => "investigation",
        }
    }
}

impl std::str::FromStr for QueryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueryCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("unknown query category: {}", s))
    }
}

impl std::fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-query context handed to the router and each adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryContext {
    pub agent_name: String,
    #[serde(default)]
    pub case_id: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub category: QueryCategory,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub preferred_provider: Option<String>,
}

impl QueryContext {
    pub fn new(agent_name: impl Into<String>, category: QueryCategory) -> Self {
        Self {
            agent_name: agent_name.into(),
            case_id: None,
            priority: Priority::Medium,
            category,
            specialization: None,
            max_tokens: None,
            temperature: None,
            preferred_provider: None,
        }
    }

    pub fn with_case(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_specialization(mut self, specialization: impl Into<String>) -> Self {
        self.specialization = Some(specialization.into());
        self
    }

    pub fn with_preferred_provider(mut self, provider: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider.into());
        self
    }
}

/// Successful answer from one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    pub provider: String,
    pub content: String,
    /// In `[0, 1]`
    pub confidence: f64,
    pub processing_time_secs: f64,
    pub tokens_used: u64,
    pub cost: f64,
    #[serde(default)]
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

/// One AI backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Identifier referenced by routing rules
    fn id(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    fn display_name(&self) -> &str {
        self.id()
    }

    async fn query(
        &self,
        prompt: &str,
        ctx: &QueryContext,
        system_prompt: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Lightweight liveness check. Never errors: unreachable means unhealthy.
    async fn health_check(&self) -> bool;
}

/// Build the shared HTTP client used by an adapter
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Resolve the API key for a provider: environment first, then auth.json
pub fn resolve_api_key(config: &ProviderConfig, auth: &AuthConfig) -> Option<String> {
    if let Some(var) = &config.api_key_env {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                return Some(key);
            }
        }
    }
    auth.api_key(&config.id).map(|k| k.to_string())
}

/// Turn a non-success HTTP response into [`ProviderError::Status`]
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Instantiate the adapter for a configured provider.
///
/// Remote providers without credentials fail with [`ProviderError::MissingCredentials`].
pub fn build_provider(
    mut config: ProviderConfig,
    auth: &AuthConfig,
    timeout: Duration,
) -> Result<Arc<dyn Provider>, ProviderError> {
    if let Some(base_url) = auth.base_url(&config.id) {
        config.base_url = base_url.to_string();
    }
    let api_key = resolve_api_key(&config, auth);
    if config.kind.requires_key() && api_key.is_none() {
        let source = config
            .api_key_env
            .clone()
            .unwrap_or_else(|| format!("auth.json entry '{}'", config.id));
        return Err(ProviderError::MissingCredentials(source));
    }

    let provider: Arc<dyn Provider> = match config.kind {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            config,
            api_key.unwrap_or_default(),
            timeout,
        )?),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config, api_key, timeout)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(config, timeout)?),
    };
    Ok(provider)
}
