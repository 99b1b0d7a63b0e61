//! Inter-agent message envelope.
//!
//! The serde shape of [`Message`] is the wire shape used by any transport that
//! carries messages across process boundaries:
//! `{id, sender, recipient, messageType, content, timestamp, priority}` with an
//! ISO-8601 timestamp and an integer priority (1-5).

use crate::task::Priority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Message type tag. Unknown tags survive as `Custom`.
///
/// Build custom tags with [`MessageType::custom`]: a `Custom` holding one of the
/// four built-in tags reads back as the built-in variant after a wire round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    CollaborationRequest,
    CollaborationResponse,
    DataShare,
    TaskDelegation,
    /// Never one of the built-in tags when built through `custom` or serde
    Custom(String),
}

impl MessageType {
    /// Tag for an application-defined message. Built-in tags map to their variant.
    pub fn custom(tag: impl Into<String>) -> Self {
        MessageType::from(tag.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageType::CollaborationRequest => "collaboration_request",
            MessageType::CollaborationResponse => "collaboration_response",
            MessageType::DataShare => "data_share",
            MessageType::TaskDelegation => "task_delegation",
            MessageType::Custom(tag) => tag,
        }
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "collaboration_request" => MessageType::CollaborationRequest,
            "collaboration_response" => MessageType::CollaborationResponse,
            "data_share" => MessageType::DataShare,
            "task_delegation" => MessageType::TaskDelegation,
            _ => MessageType::Custom(tag),
        }
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        MessageType::from(tag.to_string())
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::Custom(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message produced by one agent and consumed once by another agent's mailbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub message_type: MessageType,
    pub content: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub priority: Priority,
}

impl Message {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        message_type: impl Into<MessageType>,
        content: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.into(),
            recipient: recipient.into(),
            message_type: MessageType::from(String::from(message_type.into())),
            content,
            timestamp: Utc::now(),
            priority: Priority::Medium,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Serialize into the wire shape
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from the wire shape
    pub fn from_wire(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}
