//! Error types shared across the council core

/// Failure of a single provider adapter call
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("OpenAI API call failed: {0}")]
    OpenAi(#[from] async_openai::error::OpenAIError),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode response: {0}")]
    Decode(String),
    #[error("Missing credentials: {0} not set")]
    MissingCredentials(String),
    #[error("{0}")]
    Other(String),
}

/// Failure of a routed query as seen by the caller
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("No healthy AI providers available")]
    NoHealthyProvider,
    #[error("All AI providers failed after {attempts} attempt(s). Last error: {last}")]
    AllProvidersFailed {
        attempts: usize,
        #[source]
        last: ProviderError,
    },
    #[error("Provider {provider} failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),
    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CouncilError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),
    #[error("Agent {0} is not registered with a council")]
    NotInCouncil(String),
    #[error("Collaboration with {agent} failed: {reason}")]
    CollaborationFailed { agent: String, reason: String },
    #[error("Collaboration with {0} timed out")]
    CollaborationTimeout(String),
    #[error("Agent {0} is shut down")]
    ShutDown(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = CouncilError> = std::result::Result<T, E>;
