//! In-process store backed by locked maps and broadcast channels

use super::{session_field, session_key, SharedStore, CHANNEL_CAPACITY};
use crate::error::StoreError;
use crate::events::{heartbeat_key, Heartbeat};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone, Default)]
pub struct MemoryStore {
    heartbeats: Arc<RwLock<HashMap<String, Heartbeat>>>,
    /// session key -> (agent field -> snapshot)
    sessions: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        if let Some(tx) = self.channels.read().get(channel) {
            return tx.clone();
        }
        self.channels
            .write()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn put_heartbeat(&self, agent_id: &str, beat: &Heartbeat) -> Result<(), StoreError> {
        self.heartbeats
            .write()
            .insert(heartbeat_key(agent_id), beat.clone());
        Ok(())
    }

    async fn heartbeat(&self, agent_id: &str) -> Result<Option<Heartbeat>, StoreError> {
        Ok(self.heartbeats.read().get(&heartbeat_key(agent_id)).cloned())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        // Err only means nobody is listening right now
        let _ = self.sender(channel).send(payload.to_string());
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.sender(channel).subscribe()
    }

    async fn set_session(
        &self,
        session_id: &str,
        agent_id: &str,
        snapshot: &str,
    ) -> Result<(), StoreError> {
        self.sessions
            .write()
            .entry(session_key(session_id))
            .or_default()
            .insert(session_field(agent_id), snapshot.to_string());
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: &str,
        agent_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .sessions
            .read()
            .get(&session_key(session_id))
            .and_then(|fields| fields.get(&session_field(agent_id)))
            .cloned())
    }
}
