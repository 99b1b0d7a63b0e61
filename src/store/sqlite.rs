//! SQLite-backed store.
//!
//! Heartbeats and session snapshots are upserted; published events are
//! appended to an `events` table and fanned out to in-process subscribers.
//! Every statement runs on the blocking pool.

use super::{session_field, session_key, SharedStore, CHANNEL_CAPACITY};
use crate::error::StoreError;
use crate::events::{heartbeat_key, Heartbeat};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS heartbeats (
                key TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                payload TEXT NOT NULL,
                published_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                session_key TEXT NOT NULL,
                field TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (session_key, field)
            );

            CREATE INDEX IF NOT EXISTS idx_events_channel ON events(channel);
        "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            channels: RwLock::new(HashMap::new()),
        })
    }

    async fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    ) -> Result<T, StoreError>
    where
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Backend(format!("connection lock poisoned: {}", e)))?;
            Ok(f(&conn)?)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("sqlite worker failed: {}", e)))?
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

    /// Payloads previously published on a channel, oldest first
    pub async fn history(&self, channel: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let channel = channel.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload FROM (
                    SELECT id, payload FROM events WHERE channel = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![channel, limit as i64], |row| row.get(0))?;
            rows.collect()
        })
        .await
    }
}

#[async_trait]
impl SharedStore for SqliteStore {
    async fn put_heartbeat(&self, agent_id: &str, beat: &Heartbeat) -> Result<(), StoreError> {
        let record = serde_json::to_string(beat)?;
        let key = heartbeat_key(agent_id);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO heartbeats (key, record, updated_at) VALUES (?1, ?2, ?3)",
                params![key, record, Utc::now().to_rfc3339()],
            )
        })
        .await?;
        Ok(())
    }

    async fn heartbeat(&self, agent_id: &str) -> Result<Option<Heartbeat>, StoreError> {
        let key = heartbeat_key(agent_id);
        let record: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT record FROM heartbeats WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        Ok(record.map(|r| serde_json::from_str(&r)).transpose()?)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let (row_channel, row_payload) = (channel.to_string(), payload.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO events (channel, payload, published_at) VALUES (?1, ?2, ?3)",
                params![row_channel, row_payload, Utc::now().to_rfc3339()],
            )
        })
        .await?;
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
        let (key, field) = (session_key(session_id), session_field(agent_id));
        let snapshot = snapshot.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sessions (session_key, field, snapshot, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![key, field, snapshot, Utc::now().to_rfc3339()],
            )
        })
        .await?;
        Ok(())
    }

    async fn get_session(
        &self,
        session_id: &str,
        agent_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let (key, field) = (session_key(session_id), session_field(agent_id));
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT snapshot FROM sessions WHERE session_key = ?1 AND field = ?2",
                params![key, field],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }
}
