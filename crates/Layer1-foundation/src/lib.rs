//! # tasktrack-foundation
//!
//! Foundation layer for tasktrack:
//! - Core: data model (Task, TaskStatus, Agent, LogRecord) and collaborator traits
//! - Storage: SQLite (persistent), Memory (volatile), JsonStore (config)
//! - Config: TrackerConfig
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Layer2-task                                            │
//! │  Registry · Scheduler · BroadcastHub · EventCorrelator  │
//! │                     │                                   │
//! │          ┌──────────┼──────────┐                        │
//! │          ▼          ▼          ▼                        │
//! │     TaskStore   AgentStore   LogSink                    │
//! │          │          │          │                        │
//! │          └──────────┼──────────┘                        │
//! │                     ▼                                   │
//! │        SqliteStore / MemoryStore                        │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core
// ============================================================================
pub use crate::core::{
    // Traits
    AgentStore,
    Clock,
    LogSink,
    SystemClock,
    TaskStore,
    // Types
    Agent,
    AgentStatus,
    LogLevel,
    LogQuery,
    LogRecord,
    NewAgent,
    NewLogRecord,
    Task,
    TaskId,
    TaskStatus,
};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    HubConfig, LoggingConfig, SchedulerConfig, StorageConfig, TrackerConfig, TRACKER_CONFIG_FILE,
};

// ============================================================================
// Storage
// ============================================================================
pub use storage::{JsonStore, MemoryStore, SqliteStore, DB_FILE};
