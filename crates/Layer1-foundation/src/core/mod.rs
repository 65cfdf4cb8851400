//! Core Module - data model and collaborator traits
//!
//! - `types.rs`: records (Task, TaskStatus, Agent, LogRecord, ...)
//! - `traits.rs`: interfaces (TaskStore, AgentStore, LogSink, Clock)

pub mod traits;
pub mod types;

pub use traits::{AgentStore, Clock, LogSink, SystemClock, TaskStore};
pub use types::{
    Agent, AgentStatus, LogLevel, LogQuery, LogRecord, NewAgent, NewLogRecord, Task, TaskId,
    TaskStatus,
};
