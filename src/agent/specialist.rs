//! Capability contract implemented by every agent specialization

use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Static identity and declared resources of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub name: String,
    pub codename: String,
    pub specialization: String,
    pub tools: Vec<String>,
    pub ai_backends: Vec<String>,
    pub division: String,
}

/// What a specialization can do.
///
/// `supported_tasks` gates [`super::Agent::assign_task`]; `details` is free-form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(rename = "supportedTaskTypes")]
    pub supported_tasks: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl Capabilities {
    pub fn new(supported_tasks: Vec<String>) -> Self {
        Self {
            supported_tasks,
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn supports(&self, task_type: &str) -> bool {
        self.supported_tasks.iter().any(|t| t == task_type)
    }
}

/// Context passed alongside a payload to `analyze`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    /// Set when the call answers another agent's collaboration request
    #[serde(default)]
    pub collaboration: bool,
    /// Codename of the requesting agent, for collaboration calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<String>,
}

impl AnalysisContext {
    pub fn collaboration(requester: impl Into<String>) -> Self {
        Self {
            collaboration: true,
            requester: Some(requester.into()),
            ..Default::default()
        }
    }
}

/// A concrete agent specialization.
///
/// The agent runtime only ever calls [`Specialist::capabilities`] and
/// [`Specialist::analyze`]; what happens inside is opaque to it.
#[async_trait]
pub trait Specialist: Send + Sync {
    fn profile(&self) -> &AgentProfile;

    fn capabilities(&self) -> Capabilities;

    async fn analyze(&self, payload: Value, ctx: AnalysisContext) -> anyhow::Result<Value>;

    /// Hook for message types the runtime does not handle itself
    async fn handle_custom_message(&self, message: &Message) {
        tracing::warn!(
            agent = %self.profile().codename,
            sender = %message.sender,
            message_type = %message.message_type,
            "unhandled message type"
        );
    }
}
