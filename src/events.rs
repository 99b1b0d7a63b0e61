//! Records the core publishes to the shared store and to real-time listeners.
//!
//! These are the only things agents emit to the outside world: a periodic
//! heartbeat and one completion event per finished task.

use crate::agent::AgentStatus;
use crate::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known pub/sub channel for task completion events
pub const COMPLETION_CHANNEL: &str = "task_completions";

/// Emitted exactly once per accepted task, after it left the active table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub agent: String,
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CompletionEvent {
    pub fn from_task(agent: impl Into<String>, task: &Task) -> Self {
        Self {
            agent: agent.into(),
            task_id: task.id.clone(),
            status: task.status,
            result: task.result.clone(),
            error: task.error.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Liveness record written to the shared store on every heartbeat tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub status: AgentStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub active_tasks: usize,
    pub specialization: String,
}

/// Store key for an agent's heartbeat record
pub fn heartbeat_key(codename: &str) -> String {
    format!("agent:{}", codename.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completion_event_from_failed_task() {
        let mut task = Task::new("CASE-1", "facial_recognition", json!({}));
        task.fail("no faces found");

        let event = CompletionEvent::from_task("ORACLE", &task);
        let wire = serde_json::to_value(&event).unwrap();

        assert_eq!(wire["agent"], "ORACLE");
        assert_eq!(wire["taskId"], task.id.as_str());
        assert_eq!(wire["status"], "failed");
        assert_eq!(wire["error"], "no faces found");
        assert!(wire.get("result").is_none());
    }

    #[test]
    fn test_heartbeat_key_is_lowercased() {
        assert_eq!(heartbeat_key("ATLAS"), "agent:atlas");
    }
}
