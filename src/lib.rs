//! Obsidian Council - a council of specialist investigation agents
//!
//! This crate provides:
//! - Agents with a mailbox, a worker pool, heartbeats and sessions
//! - Peer messaging and request/response collaboration between agents
//! - An AI provider router with health checks, failover and cost tracking
//! - A shared store (in-memory or SQLite) for heartbeats, events and sessions

pub mod agent;
pub mod auth;
pub mod bus;
pub mod config;
pub mod council;
pub mod error;
pub mod events;
pub mod message;
pub mod provider;
pub mod store;
pub mod task;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use agent::{
    Agent, AgentProfile, AgentStatus, AnalysisContext, Capabilities, Specialist,
    SpecialistRegistry,
};
pub use auth::AuthConfig;
pub use config::CouncilConfig;
pub use council::{Council, CouncilDirectory};
pub use error::{CouncilError, ProviderError, RouterError, StoreError};
pub use events::CompletionEvent;
pub use message::{Message, MessageType};
pub use provider::{Provider, ProviderConfig, ProviderRouter, QueryCategory, QueryContext};
pub use store::{MemoryStore, SharedStore, SqliteStore};
pub use task::{Priority, Task, TaskStatus};
pub use telemetry::Telemetry;
