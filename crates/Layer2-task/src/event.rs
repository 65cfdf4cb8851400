//! Lifecycle events - ephemeral notifications for live observers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tasktrack_foundation::{Task, TaskId};

/// What happened to the task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Task entered RUNNING
    TaskStarted,

    /// Task reached a terminal status
    TaskCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskStarted => "task_started",
            EventKind::TaskCompleted => "task_completed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A status change, handed once to the broadcast hub and never stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub task_id: TaskId,
    pub kind: EventKind,

    /// Kind-specific fields, always a JSON object
    pub payload: Value,

    pub emitted_at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn started(task: &Task, emitted_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id,
            kind: EventKind::TaskStarted,
            payload: json!({
                "name": task.name,
                "command": task.command,
                "status": task.status,
                "agent_id": task.agent_id,
            }),
            emitted_at,
        }
    }

    /// Terminal event; carries `result` or `error` when the task has one
    pub fn completed(task: &Task, emitted_at: DateTime<Utc>) -> Self {
        let mut payload = Map::new();
        payload.insert("status".into(), json!(task.status));
        if let Some(ref result) = task.result {
            payload.insert("result".into(), json!(result));
        }
        if let Some(ref error) = task.error {
            payload.insert("error".into(), json!(error));
        }

        Self {
            task_id: task.id,
            kind: EventKind::TaskCompleted,
            payload: Value::Object(payload),
            emitted_at,
        }
    }

    /// Flat wire message: `{"event", "task_id", "emitted_at", ...payload}`
    pub fn to_message(&self) -> Value {
        let mut message = Map::new();
        message.insert("event".into(), json!(self.kind));
        message.insert("task_id".into(), json!(self.task_id));
        message.insert("emitted_at".into(), json!(self.emitted_at));

        if let Value::Object(ref fields) = self.payload {
            for (key, value) in fields {
                message.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        Value::Object(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasktrack_foundation::TaskStatus;

    #[test]
    fn test_started_message_shape() {
        let task = Task::running("t1", "noop", None, Utc::now());
        let message = LifecycleEvent::started(&task, Utc::now()).to_message();

        assert_eq!(message["event"], "task_started");
        assert_eq!(message["task_id"], task.id.to_string());
        assert_eq!(message["command"], "noop");
        assert_eq!(message["status"], "running");
    }

    #[test]
    fn test_completed_message_has_result_only() {
        let mut task = Task::running("t1", "noop", None, Utc::now());
        task.status = TaskStatus::Completed;
        task.result = Some("Executed: noop".into());
        task.completed_at = Some(Utc::now());

        let message = LifecycleEvent::completed(&task, Utc::now()).to_message();
        assert_eq!(message["event"], "task_completed");
        assert_eq!(message["status"], "completed");
        assert_eq!(message["result"], "Executed: noop");
        assert!(message.get("error").is_none());
    }

    #[test]
    fn test_payload_cannot_shadow_envelope() {
        let task = Task::running("t1", "noop", None, Utc::now());
        let mut event = LifecycleEvent::started(&task, Utc::now());
        event.payload = json!({"event": "spoofed"});

        assert_eq!(event.to_message()["event"], "task_started");
    }
}
