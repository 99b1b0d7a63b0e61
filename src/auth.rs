//! Provider credentials
//!
//! API keys come from each provider's environment variable first (after
//! loading `.env`), then from `auth.json`:
//! - $XDG_DATA_HOME/obsidian-council/auth.json (preferred)
//! - ~/.local/share/obsidian-council/auth.json (fallback)
//!
//! `auth.json` maps provider ids to entries:
//! `{"claude": {"type": "api", "key": "sk-..."}, "local": {"type": "api", "key": "", "base_url": "http://gpu:11434"}}`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Authentication entry for a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthEntry {
    /// Simple API key authentication
    #[serde(rename = "api")]
    Api {
        key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl AuthEntry {
    pub fn api_key(&self) -> &str {
        match self {
            AuthEntry::Api { key, .. } => key,
        }
    }

    /// Base URL override, if configured
    pub fn base_url(&self) -> Option<&str> {
        match self {
            AuthEntry::Api { base_url, .. } => base_url.as_deref(),
        }
    }
}

/// Contents of auth.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthConfig {
    pub providers: HashMap<String, AuthEntry>,
}

impl AuthConfig {
    /// Load `.env` into the environment and auth.json from the default location
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from a specific path. A missing file is an empty config.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: AuthConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Default auth.json path
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
            let path = PathBuf::from(xdg_data).join("obsidian-council/auth.json");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir().map(|home| home.join(".local/share/obsidian-council/auth.json"))
    }

    pub fn get(&self, provider: &str) -> Option<&AuthEntry> {
        self.providers.get(provider)
    }

    /// API key for a provider, ignoring empty keys
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .map(|e| e.api_key())
            .filter(|k| !k.is_empty())
    }

    pub fn base_url(&self, provider: &str) -> Option<&str> {
        self.providers.get(provider).and_then(|e| e.base_url())
    }
}
