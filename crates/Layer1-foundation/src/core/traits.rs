//! Core Traits - collaborator interfaces consumed by the task layer
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Layer2-task                                         │
//! │  TaskRegistry ──► TaskStore   (create/get/update_if) │
//! │  EventCorrelator ──► LogSink  (append, query)        │
//! │  AgentRegistry ──► AgentStore (register, heartbeat)  │
//! │  both ──► Clock               (timestamps)           │
//! ├──────────────────────────────────────────────────────┤
//! │  Layer1-foundation (this layer)                      │
//! │  MemoryStore, SqliteStore, SystemClock               │
//! └──────────────────────────────────────────────────────┘
//! ```

use super::types::{
    Agent, LogQuery, LogRecord, NewAgent, NewLogRecord, Task, TaskId, TaskStatus,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// ============================================================================
// TaskStore
// ============================================================================

/// Durable storage behind the task registry
///
/// Failures surface as `Error::Storage`/`Error::Sqlite` and are never retried
/// by callers in this workspace.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a freshly created task
    async fn insert(&self, task: &Task) -> Result<()>;

    /// Point lookup
    async fn get(&self, id: TaskId) -> Result<Option<Task>>;

    /// Tasks ordered by creation time
    async fn list(&self, skip: usize, limit: usize) -> Result<Vec<Task>>;

    /// Replace the stored task only if its stored status is still `expected`.
    ///
    /// Returns `false` when the row is missing or its status differs.
    async fn update_if_status(&self, task: &Task, expected: TaskStatus) -> Result<bool>;

    /// Backend name for diagnostics
    fn name(&self) -> &'static str;
}

// ============================================================================
// AgentStore
// ============================================================================

/// Storage for the agent directory
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Insert with a fresh id; `Error::InvalidInput` when the name is taken
    async fn insert_agent(&self, agent: NewAgent) -> Result<Agent>;

    async fn get_agent(&self, id: i64) -> Result<Option<Agent>>;

    /// Agents in id order
    async fn list_agents(&self, skip: usize, limit: usize) -> Result<Vec<Agent>>;

    /// Mark the agent active as of `at`; `None` if it does not exist
    async fn heartbeat(&self, id: i64, at: DateTime<Utc>) -> Result<Option<Agent>>;

    /// Remove one agent; `false` if it did not exist
    async fn delete_agent(&self, id: i64) -> Result<bool>;
}

// ============================================================================
// LogSink
// ============================================================================

/// Append-only destination for correlated log lines, plus read access
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append a record, returning its assigned id
    async fn append(&self, record: NewLogRecord) -> Result<i64>;

    /// Matching records, newest first
    async fn list(&self, query: &LogQuery) -> Result<Vec<LogRecord>>;

    async fn get(&self, id: i64) -> Result<Option<LogRecord>>;

    /// Remove one record; `false` if it did not exist
    async fn delete(&self, id: i64) -> Result<bool>;
}

// ============================================================================
// Clock
// ============================================================================

/// Time source, injectable so lifecycle timestamps are testable
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
