//! Provider configuration

use serde::{Deserialize, Serialize};

/// Wire protocol spoken by a provider adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic Messages API
    Anthropic,
    /// OpenAI chat completions (also Gemini's and local servers' compatible endpoints)
    #[serde(rename = "openai")]
    OpenAi,
    /// Ollama generate API
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }

    /// Whether the backend refuses requests without an API key
    pub fn requires_key(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }
}

/// Configuration for one AI backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Identifier used by routing rules and preferred-provider hints
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    pub kind: ProviderKind,
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub model: String,
    /// Fixed confidence reported for this backend's answers
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub cost_per_1k_input: f64,
    #[serde(default)]
    pub cost_per_1k_output: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_confidence() -> f64 {
    0.8
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.1
}

impl ProviderConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Anthropic Claude
    pub fn claude() -> Self {
        Self {
            id: "claude".to_string(),
            name: Some("Claude".to_string()),
            kind: ProviderKind::Anthropic,
            base_url: "https://api.anthropic.com/v1".to_string(),
            api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
            model: "claude-sonnet-4-20250514".to_string(),
            confidence: 0.9,
            cost_per_1k_input: 0.003,
            cost_per_1k_output: 0.015,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    /// OpenAI ChatGPT
    pub fn chatgpt() -> Self {
        Self {
            id: "chatgpt".to_string(),
            name: Some("ChatGPT".to_string()),
            kind: ProviderKind::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            model: "gpt-4o".to_string(),
            confidence: 0.85,
            cost_per_1k_input: 0.01,
            cost_per_1k_output: 0.01,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    /// Google Gemini via its OpenAI-compatible endpoint
    pub fn gemini() -> Self {
        Self {
            id: "gemini".to_string(),
            name: Some("Gemini".to_string()),
            kind: ProviderKind::OpenAi,
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            api_key_env: Some("GEMINI_API_KEY".to_string()),
            model: "gemini-1.5-pro".to_string(),
            confidence: 0.8,
            cost_per_1k_input: 0.001,
            cost_per_1k_output: 0.001,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    /// Local model served by Ollama
    pub fn local() -> Self {
        Self {
            id: "local".to_string(),
            name: Some("Local".to_string()),
            kind: ProviderKind::Ollama,
            base_url: "http://localhost:11434".to_string(),
            api_key_env: None,
            model: "llama3.1".to_string(),
            confidence: 0.7,
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    /// The default provider roster
    pub fn defaults() -> Vec<Self> {
        vec![Self::claude(), Self::chatgpt(), Self::gemini(), Self::local()]
    }

    pub(crate) fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.cost_per_1k_input
            + output_tokens as f64 * self.cost_per_1k_output)
            / 1000.0
    }
}
