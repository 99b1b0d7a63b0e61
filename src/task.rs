//! Task records and their lifecycle states

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Task and message priority. Serialized as its integer level (1-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
    Critical = 4,
    Emergency = 5,
}

impl Priority {
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
            Priority::Emergency => "emergency",
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            1 => Ok(Priority::Low),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::High),
            4 => Ok(Priority::Critical),
            5 => Ok(Priority::Emergency),
            other => Err(format!("priority must be between 1 and 5, got {}", other)),
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.level()
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" | "1" => Ok(Priority::Low),
            "medium" | "2" => Ok(Priority::Medium),
            "high" | "3" => Ok(Priority::High),
            "critical" | "4" => Ok(Priority::Critical),
            "emergency" | "5" => Ok(Priority::Emergency),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A unit of analysis work owned by exactly one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub case_id: String,
    pub task_type: String,
    pub priority: Priority,
    pub payload: Value,
    pub assigned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Percentage, 0-100
    pub progress: f32,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn new(case_id: impl Into<String>, task_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            case_id: case_id.into(),
            task_type: task_type.into(),
            priority: Priority::Medium,
            payload,
            assigned_at: Utc::now(),
            deadline: None,
            progress: 0.0,
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Build a task from a `task_delegation` message body.
    ///
    /// Expected shape: `{"task_type": .., "case_id"?: .., "priority"?: 1-5, "data"?: {..}, "deadline"?: ISO-8601}`.
    /// Returns `None` when no task type is present.
    pub fn from_delegation(content: &Value) -> Option<Self> {
        let task_type = content.get("task_type").and_then(|v| v.as_str())?;
        let case_id = content
            .get("case_id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let priority = content
            .get("priority")
            .and_then(|v| v.as_u64())
            .and_then(|p| u8::try_from(p).ok())
            .and_then(|p| Priority::try_from(p).ok())
            .unwrap_or_default();
        let payload = content
            .get("data")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));

        let mut task = Task::new(case_id, task_type, payload).with_priority(priority);
        task.deadline = content
            .get("deadline")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));
        Some(task)
    }

    pub(crate) fn complete(&mut self, result: Value) {
        self.status = TaskStatus::Completed;
        self.progress = 100.0;
        self.result = Some(result);
        self.error = None;
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.result = None;
        self.error = Some(error.into());
    }
}
