//! Agent system
//!
//! - `Specialist`: the capability contract a specialization implements
//! - `Agent`: runtime around one specialist (task table, mailbox, heartbeat)
//! - `SpecialistRegistry`: codename -> constructor, preloaded with the built-in roster

mod base;
mod builtins;
mod registry;
mod specialist;

pub use base::Agent;
pub use builtins::{builtin_profiles, investigation_prompt, BuiltinDefinition, BuiltinSpecialist};
pub use registry::{SpecialistDeps, SpecialistFactory, SpecialistRegistry};
pub use specialist::*;

use serde::{Deserialize, Serialize};

/// Coarse agent state reported in heartbeats and status reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Offline,
    Idle,
    Working,
    /// Could not start its background loops
    Error,
    /// Answering another agent's collaboration request
    Collaboration,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Offline => write!(f, "offline"),
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Working => write!(f, "working"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Collaboration => write!(f, "collaboration"),
        }
    }
}
