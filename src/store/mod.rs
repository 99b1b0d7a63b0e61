//! Shared store: heartbeats, completion pub/sub and session snapshots.
//!
//! The store is an external, transactionless collaborator. Writes are
//! independent and last-write-wins; nothing here needs cross-write atomicity.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::events::Heartbeat;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of each in-process pub/sub channel
pub(crate) const CHANNEL_CAPACITY: usize = 256;

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Overwrite the heartbeat record for an agent
    async fn put_heartbeat(&self, agent_id: &str, beat: &Heartbeat) -> Result<(), StoreError>;

    async fn heartbeat(&self, agent_id: &str) -> Result<Option<Heartbeat>, StoreError>;

    /// Publish a payload on a channel. Having no subscribers is not an error.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String>;

    async fn set_session(
        &self,
        session_id: &str,
        agent_id: &str,
        snapshot: &str,
    ) -> Result<(), StoreError>;

    async fn get_session(&self, session_id: &str, agent_id: &str)
        -> Result<Option<String>, StoreError>;
}

pub(crate) fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

pub(crate) fn session_field(agent_id: &str) -> String {
    format!("agent:{}", agent_id.to_lowercase())
}

impl StoreConfig {
    /// Open the configured backend
    pub fn open(&self) -> Result<Arc<dyn SharedStore>, StoreError> {
        match self {
            StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreConfig::Sqlite { path } => {
                tracing::info!(path = %path.display(), "opening sqlite store");
                Ok(Arc::new(SqliteStore::open(path)?))
            }
        }
    }
}
