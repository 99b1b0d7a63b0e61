//! Configuration for the council runtime
//!
//! Loaded from YAML; every section has defaults so an empty or missing file
//! yields a working council over the built-in roster.

use crate::provider::{ProviderConfig, RoutingTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    /// AI backends to register with the router
    pub providers: Vec<ProviderConfig>,

    /// Per-category overrides merged over the default routing table
    pub routing: Option<RoutingTable>,

    /// Codenames to instantiate; empty means the whole registry
    pub agents: Vec<String>,

    pub runtime: RuntimeConfig,

    pub store: StoreConfig,

    pub telemetry: TelemetryConfig,
}

/// Timing and concurrency knobs shared by every agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Size of each agent's task worker pool
    pub workers_per_agent: usize,
    pub heartbeat_interval_secs: u64,
    pub health_check_interval_secs: u64,
    /// Timeout applied to every provider HTTP request
    pub request_timeout_secs: u64,
    /// Default wait for a correlated collaboration response
    pub collaboration_timeout_secs: u64,
}

/// Which shared store backs heartbeats, events and sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Directory for log files
    pub log_dir: PathBuf,

    /// Enable verbose logging
    pub verbose: bool,

    /// OTLP/HTTP endpoint for span export
    pub otel_endpoint: Option<String>,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            providers: ProviderConfig::defaults(),
            routing: None,
            agents: Vec::new(),
            runtime: RuntimeConfig::default(),
            store: StoreConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers_per_agent: 4,
            heartbeat_interval_secs: 30,
            health_check_interval_secs: 300,
            request_timeout_secs: 60,
            collaboration_timeout_secs: 120,
        }
    }
}

impl RuntimeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn collaboration_timeout(&self) -> Duration {
        Duration::from_secs(self.collaboration_timeout_secs)
    }

    /// At least one worker, whatever the file says
    pub fn workers(&self) -> usize {
        self.workers_per_agent.max(1)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_dir: default_data_dir().join("logs"),
            verbose: false,
            otel_endpoint: None,
        }
    }
}

/// `$XDG_DATA_HOME/obsidian-council`, falling back to `.obsidian_council`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("obsidian-council"))
        .unwrap_or_else(|| PathBuf::from(".obsidian_council"))
}

/// `$XDG_CONFIG_HOME/obsidian-council/council.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("obsidian-council").join("council.yaml"))
}

impl CouncilConfig {
    /// Load from a YAML file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))
    }

    /// Load from an explicit path, else the default location, else defaults
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Default routing table with this config's overrides applied
    pub fn routing_table(&self) -> RoutingTable {
        let mut routes = RoutingTable::default();
        if let Some(overrides) = &self.routing {
            routes.merge(overrides.clone());
        }
        routes
    }

    /// Set verbose logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.telemetry.verbose = verbose;
        self
    }

    /// Set log directory
    pub fn with_log_dir(mut self, log_dir: PathBuf) -> Self {
        self.telemetry.log_dir = log_dir;
        self
    }

    pub fn with_otel_endpoint(mut self, endpoint: Option<String>) -> Self {
        if endpoint.is_some() {
            self.telemetry.otel_endpoint = endpoint;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderKind, QueryCategory};

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = CouncilConfig::from_yaml("").unwrap();
        assert_eq!(config.providers.len(), 4);
        assert_eq!(config.runtime.workers_per_agent, 4);
        assert_eq!(config.runtime.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.store, StoreConfig::Memory);
        assert!(config.agents.is_empty());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
providers:
  - id: local
    kind: ollama
    base_url: http://gpu-box:11434
    model: mistral
    confidence: 0.65
routing:
  investigation: [local]
agents: [ATLAS, ORACLE]
runtime:
  workers_per_agent: 2
store:
  kind: sqlite
  path: /tmp/council.db
"#;
        let config = CouncilConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].kind, ProviderKind::Ollama);
        assert_eq!(config.agents, vec!["ATLAS", "ORACLE"]);
        assert_eq!(config.runtime.workers(), 2);
        assert_eq!(config.runtime.collaboration_timeout_secs, 120);
        assert_eq!(
            config.store,
            StoreConfig::Sqlite {
                path: PathBuf::from("/tmp/council.db")
            }
        );

        let routes = config.routing_table();
        assert_eq!(routes.candidates(QueryCategory::Investigation), &["local"]);
        assert_eq!(
            routes.candidates(QueryCategory::Analysis),
            &["claude", "chatgpt", "gemini"]
        );
    }

    #[test]
    fn test_zero_workers_still_runs_one() {
        let runtime = RuntimeConfig {
            workers_per_agent: 0,
            ..Default::default()
        };
        assert_eq!(runtime.workers(), 1);
    }
}
