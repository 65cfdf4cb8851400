//! Core Types - task and log records shared by every layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

// ============================================================================
// TaskId
// ============================================================================

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("Invalid task id '{}': {}", s, e)))
    }
}

// ============================================================================
// TaskStatus
// ============================================================================

/// Lifecycle status of a task
///
/// ```text
/// PENDING ──► RUNNING ──┬──► COMPLETED
///                       ├──► FAILED
///                       └──► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet dispatched
    Pending,

    /// Unit of work in flight
    Running,

    /// Finished with a result
    Completed,

    /// Finished with an error
    Failed,

    /// Stopped by an external actor
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// States a task may be created in
    pub fn is_initial(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    /// The single table of legal lifecycle edges
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
        )
    }

    /// Get a symbol for the state (for terminal output)
    pub fn symbol(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "◯",
            TaskStatus::Running => "⟳",
            TaskStatus::Completed => "✓",
            TaskStatus::Failed => "✗",
            TaskStatus::Cancelled => "⊘",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown task status: {}", s)))
    }
}

// ============================================================================
// Task
// ============================================================================

/// A tracked unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,

    /// Display label
    pub name: String,

    /// Opaque instruction string
    pub command: String,

    /// Current lifecycle status
    pub status: TaskStatus,

    /// Output, present only once COMPLETED
    pub result: Option<String>,

    /// Failure detail, present only once FAILED
    pub error: Option<String>,

    /// Executor reference, not owned
    pub agent_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A task waiting for dispatch
    pub fn pending(
        name: impl Into<String>,
        command: impl Into<String>,
        agent_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            name: name.into(),
            command: command.into(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            agent_id,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// A task whose execution was already dispatched at submission
    pub fn running(
        name: impl Into<String>,
        command: impl Into<String>,
        agent_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut task = Self::pending(name, command, agent_id, now);
        task.status = TaskStatus::Running;
        task.started_at = Some(now);
        task
    }

    /// Check if task is still active (pending or running)
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Get execution duration if task has started
    pub fn duration(&self) -> Option<std::time::Duration> {
        let start = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - start).to_std().unwrap_or_default())
    }

    /// Verify the record-level lifecycle invariants
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        match (self.status, self.started_at) {
            (TaskStatus::Pending, Some(_)) => return Err("pending task has started_at".into()),
            (TaskStatus::Pending, None) => {}
            (_, None) => return Err(format!("{} task has no started_at", self.status)),
            (_, Some(started)) if started < self.created_at => {
                return Err("started_at precedes created_at".into())
            }
            _ => {}
        }

        match (self.status.is_terminal(), self.completed_at) {
            (false, Some(_)) => return Err("active task has completed_at".into()),
            (true, None) => return Err(format!("{} task has no completed_at", self.status)),
            (true, Some(completed)) if Some(completed) < self.started_at => {
                return Err("completed_at precedes started_at".into())
            }
            _ => {}
        }

        if self.result.is_some() && self.status != TaskStatus::Completed {
            return Err(format!("{} task carries a result", self.status));
        }
        if self.error.is_some() && self.status != TaskStatus::Failed {
            return Err(format!("{} task carries an error", self.status));
        }

        Ok(())
    }
}

// ============================================================================
// Agents
// ============================================================================

/// Liveness of a registered agent, as last reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Registered, no heartbeat seen yet
    Inactive,
    /// Has sent at least one heartbeat
    Active,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Inactive => "inactive",
            AgentStatus::Active => "active",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inactive" => Ok(AgentStatus::Inactive),
            "active" => Ok(AgentStatus::Active),
            other => Err(Error::InvalidInput(format!("Unknown agent status: {}", other))),
        }
    }
}

/// An agent before the store assigns it an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewAgent {
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewAgent {
    pub fn new(name: impl Into<String>, description: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            description,
            created_at: now,
        }
    }
}

/// A registered agent; tasks refer to it through `Task::agent_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: i64,

    /// Unique across the store
    pub name: String,
    pub description: Option<String>,
    pub status: AgentStatus,
    pub is_active: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn from_new(id: i64, agent: NewAgent) -> Self {
        Self {
            id,
            name: agent.name,
            description: agent.description,
            status: AgentStatus::Inactive,
            is_active: true,
            last_heartbeat: None,
            created_at: agent.created_at,
            updated_at: agent.created_at,
        }
    }

    /// Record a heartbeat at `at`
    pub fn beat(&mut self, at: DateTime<Utc>) {
        self.status = AgentStatus::Active;
        self.last_heartbeat = Some(at);
        self.updated_at = at;
    }
}

// ============================================================================
// Log records
// ============================================================================

/// Severity of a correlated log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::InvalidInput(format!("Unknown log level: {}", other))),
        }
    }
}

/// A log line before the sink assigns it an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogRecord {
    pub level: LogLevel,
    pub message: String,
    pub source: Option<String>,
    pub task_id: Option<String>,
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewLogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            source: None,
            task_id: None,
            agent_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_task(mut self, task_id: impl ToString) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn with_agent(mut self, agent_id: Option<String>) -> Self {
        self.agent_id = agent_id;
        self
    }
}

/// A stored log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub level: LogLevel,
    pub message: String,
    pub source: Option<String>,
    pub task_id: Option<String>,
    pub agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    pub fn from_new(id: i64, record: NewLogRecord) -> Self {
        Self {
            id,
            level: record.level,
            message: record.message,
            source: record.source,
            task_id: record.task_id,
            agent_id: record.agent_id,
            created_at: record.created_at,
        }
    }

    /// Single-line rendering for terminal output
    pub fn format_line(&self) -> String {
        format!(
            "[{}] [{}] {}{}",
            self.created_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.source
                .as_deref()
                .map(|s| format!("{}: ", s))
                .unwrap_or_default(),
            self.message
        )
    }
}

/// Filter for log listing; results are newest first
#[derive(Debug, Clone, PartialEq)]
pub struct LogQuery {
    pub level: Option<LogLevel>,
    pub source: Option<String>,
    pub task_id: Option<String>,
    pub skip: usize,
    pub limit: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            level: None,
            source: None,
            task_id: None,
            skip: 0,
            limit: 100,
        }
    }
}

impl LogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_task(mut self, task_id: impl ToString) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn with_page(mut self, skip: usize, limit: usize) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(level) = self.level {
            if record.level != level {
                return false;
            }
        }
        if let Some(ref source) = self.source {
            if record.source.as_deref() != Some(source.as_str()) {
                return false;
            }
        }
        if let Some(ref task_id) = self.task_id {
            if record.task_id.as_deref() != Some(task_id.as_str()) {
                return false;
            }
        }
        true
    }
}
