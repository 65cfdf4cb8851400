//! SQLite Storage for tasks, agents and logs
//!
//! Runtime data:
//! - Tasks: lifecycle records, updated through status-guarded writes
//! - Agents: directory of executors, unique by name
//! - Logs: correlated log lines keyed loosely to task/agent ids
//!
//! Configuration lives in JSON (storage/json/).
//!
//! ## Migration System
//!
//! Database schema is versioned. Migrations run automatically on startup.
//! - Version 1: Initial schema (tasks, logs)
//! - Version 2: Index logs by task and agent
//! - Version 3: Agents table

use crate::core::{
    Agent, AgentStatus, AgentStore, LogLevel, LogQuery, LogRecord, LogSink, NewAgent,
    NewLogRecord, Task, TaskId, TaskStatus, TaskStore,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Database file name inside the data directory
pub const DB_FILE: &str = "tasktrack.db";

const TASK_COLUMNS: &str = "id, name, command, status, result, error, agent_id, \
                            created_at, started_at, completed_at";

const AGENT_COLUMNS: &str = "id, name, description, status, is_active, last_heartbeat, \
                             created_at, updated_at";

const LOG_COLUMNS: &str = "id, level, message, source, task_id, agent_id, created_at";

/// SQLite-backed task store and log sink
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database inside `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| Error::Storage(format!("Failed to create data directory: {}", e)))?;

        let db_path = data_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.initialize_schema()?;
        store.run_migrations()?;

        info!(db_path = %db_path.display(), "SQLite store opened");
        Ok(store)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.initialize_schema()?;
        store.run_migrations()?;

        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }

    /// Get current schema version from database
    pub fn get_schema_version(&self) -> Result<i32> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::Storage(format!("Failed to get schema version: {}", e)))
    }

    /// Initialize database schema (base tables)
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Tasks table
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                command TEXT NOT NULL,
                status TEXT NOT NULL CHECK(status IN ('pending', 'running', 'completed', 'failed', 'cancelled')),
                result TEXT,
                error TEXT,
                agent_id TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_created
                ON tasks(created_at);
            CREATE INDEX IF NOT EXISTS idx_tasks_status
                ON tasks(status);

            -- Correlated logs (task_id/agent_id are not foreign keys)
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                source TEXT,
                task_id TEXT,
                agent_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_logs_created
                ON logs(created_at);

            -- Insert initial schema version if not exists
            INSERT OR IGNORE INTO schema_version (version) VALUES (1);
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Run all pending migrations
    fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version()?;

        if current_version >= CURRENT_SCHEMA_VERSION {
            debug!(
                "Database schema is up to date (version {})",
                current_version
            );
            return Ok(());
        }

        info!(
            "Running database migrations from version {} to {}",
            current_version, CURRENT_SCHEMA_VERSION
        );

        let conn = self.lock()?;

        for version in (current_version + 1)..=CURRENT_SCHEMA_VERSION {
            match version {
                2 => Self::migrate_v2(&conn)?,
                3 => Self::migrate_v3(&conn)?,
                _ => {
                    warn!("Unknown migration version: {}", version);
                }
            }

            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![version],
            )
            .map_err(|e| Error::Storage(format!("Failed to record migration: {}", e)))?;

            info!("Applied migration to version {}", version);
        }

        Ok(())
    }

    /// Migration to version 2: lookup indexes for log correlation
    fn migrate_v2(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE INDEX IF NOT EXISTS idx_logs_task ON logs(task_id);
            CREATE INDEX IF NOT EXISTS idx_logs_agent ON logs(agent_id);
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to migrate to v2: {}", e)))
    }

    /// Migration to version 3: agent directory
    fn migrate_v3(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'inactive',
                is_active INTEGER NOT NULL DEFAULT 1,
                last_heartbeat TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to migrate to v3: {}", e)))
    }
}

// ============================================================================
// Row conversion
// ============================================================================

fn to_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|r| parse_ts(idx, r)).transpose()
}

fn parse_field<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: parse_field::<TaskId>(0, row.get(0)?)?,
        name: row.get(1)?,
        command: row.get(2)?,
        status: parse_field::<TaskStatus>(3, row.get(3)?)?,
        result: row.get(4)?,
        error: row.get(5)?,
        agent_id: row.get(6)?,
        created_at: parse_ts(7, row.get(7)?)?,
        started_at: parse_opt_ts(8, row.get(8)?)?,
        completed_at: parse_opt_ts(9, row.get(9)?)?,
    })
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: parse_field::<AgentStatus>(3, row.get(3)?)?,
        is_active: row.get(4)?,
        last_heartbeat: parse_opt_ts(5, row.get(5)?)?,
        created_at: parse_ts(6, row.get(6)?)?,
        updated_at: parse_ts(7, row.get(7)?)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<LogRecord> {
    Ok(LogRecord {
        id: row.get(0)?,
        level: parse_field::<LogLevel>(1, row.get(1)?)?,
        message: row.get(2)?,
        source: row.get(3)?,
        task_id: row.get(4)?,
        agent_id: row.get(5)?,
        created_at: parse_ts(6, row.get(6)?)?,
    })
}

// ============================================================================
// Task Operations
// ============================================================================

#[async_trait]
impl TaskStore for SqliteStore {
    async fn insert(&self, task: &Task) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            &format!(
                "INSERT INTO tasks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                TASK_COLUMNS
            ),
            params![
                task.id.to_string(),
                task.name,
                task.command,
                task.status.as_str(),
                task.result,
                task.error,
                task.agent_id,
                to_text(&task.created_at),
                task.started_at.as_ref().map(to_text),
                task.completed_at.as_ref().map(to_text),
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to insert task: {}", e)))?;

        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>> {
        let conn = self.lock()?;

        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            params![id.to_string()],
            task_from_row,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to get task: {}", e)))
    }

    async fn list(&self, skip: usize, limit: usize) -> Result<Vec<Task>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM tasks ORDER BY created_at ASC, rowid ASC LIMIT ?1 OFFSET ?2",
                TASK_COLUMNS
            ))
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let tasks = stmt
            .query_map(params![limit as i64, skip as i64], task_from_row)
            .map_err(|e| Error::Storage(format!("Failed to query tasks: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Storage(format!("Failed to read task row: {}", e)))?;

        Ok(tasks)
    }

    async fn update_if_status(&self, task: &Task, expected: TaskStatus) -> Result<bool> {
        let conn = self.lock()?;

        let changed = conn
            .execute(
                r#"
                UPDATE tasks SET
                    status = ?2,
                    result = ?3,
                    error = ?4,
                    started_at = ?5,
                    completed_at = ?6
                WHERE id = ?1 AND status = ?7
                "#,
                params![
                    task.id.to_string(),
                    task.status.as_str(),
                    task.result,
                    task.error,
                    task.started_at.as_ref().map(to_text),
                    task.completed_at.as_ref().map(to_text),
                    expected.as_str(),
                ],
            )
            .map_err(|e| Error::Storage(format!("Failed to update task: {}", e)))?;

        Ok(changed == 1)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

// ============================================================================
// Agent Operations
// ============================================================================

#[async_trait]
impl AgentStore for SqliteStore {
    async fn insert_agent(&self, agent: NewAgent) -> Result<Agent> {
        let conn = self.lock()?;

        let now = to_text(&agent.created_at);
        conn.execute(
            r#"
            INSERT INTO agents (name, description, status, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, 1, ?4, ?4)
            "#,
            params![
                agent.name,
                agent.description,
                AgentStatus::Inactive.as_str(),
                now
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::InvalidInput("Agent name already exists".into())
            } else {
                Error::Storage(format!("Failed to insert agent: {}", e))
            }
        })?;

        Ok(Agent::from_new(conn.last_insert_rowid(), agent))
    }

    async fn get_agent(&self, id: i64) -> Result<Option<Agent>> {
        let conn = self.lock()?;

        conn.query_row(
            &format!("SELECT {} FROM agents WHERE id = ?1", AGENT_COLUMNS),
            params![id],
            agent_from_row,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to get agent: {}", e)))
    }

    async fn list_agents(&self, skip: usize, limit: usize) -> Result<Vec<Agent>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM agents ORDER BY id ASC LIMIT ?1 OFFSET ?2",
                AGENT_COLUMNS
            ))
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let agents = stmt
            .query_map(params![limit as i64, skip as i64], agent_from_row)
            .map_err(|e| Error::Storage(format!("Failed to query agents: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Storage(format!("Failed to read agent row: {}", e)))?;

        Ok(agents)
    }

    async fn heartbeat(&self, id: i64, at: DateTime<Utc>) -> Result<Option<Agent>> {
        let conn = self.lock()?;

        let changed = conn
            .execute(
                r#"
                UPDATE agents SET
                    status = ?2,
                    last_heartbeat = ?3,
                    updated_at = ?3
                WHERE id = ?1
                "#,
                params![id, AgentStatus::Active.as_str(), to_text(&at)],
            )
            .map_err(|e| Error::Storage(format!("Failed to record heartbeat: {}", e)))?;

        if changed == 0 {
            return Ok(None);
        }

        conn.query_row(
            &format!("SELECT {} FROM agents WHERE id = ?1", AGENT_COLUMNS),
            params![id],
            agent_from_row,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to get agent: {}", e)))
    }

    async fn delete_agent(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;

        let changed = conn
            .execute("DELETE FROM agents WHERE id = ?1", params![id])
            .map_err(|e| Error::Storage(format!("Failed to delete agent: {}", e)))?;

        Ok(changed == 1)
    }
}

// ============================================================================
// Log Operations
// ============================================================================

#[async_trait]
impl LogSink for SqliteStore {
    async fn append(&self, record: NewLogRecord) -> Result<i64> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO logs (level, message, source, task_id, agent_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.level.as_str(),
                record.message,
                record.source,
                record.task_id,
                record.agent_id,
                to_text(&record.created_at),
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to append log: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    async fn list(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                r#"
                SELECT {} FROM logs
                WHERE (?1 IS NULL OR level = ?1)
                  AND (?2 IS NULL OR source = ?2)
                  AND (?3 IS NULL OR task_id = ?3)
                ORDER BY id DESC
                LIMIT ?4 OFFSET ?5
                "#,
                LOG_COLUMNS
            ))
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(
                params![
                    query.level.map(|l| l.as_str()),
                    query.source,
                    query.task_id,
                    query.limit as i64,
                    query.skip as i64,
                ],
                log_from_row,
            )
            .map_err(|e| Error::Storage(format!("Failed to query logs: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Storage(format!("Failed to read log row: {}", e)))?;

        Ok(records)
    }

    async fn get(&self, id: i64) -> Result<Option<LogRecord>> {
        let conn = self.lock()?;

        conn.query_row(
            &format!("SELECT {} FROM logs WHERE id = ?1", LOG_COLUMNS),
            params![id],
            log_from_row,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to get log: {}", e)))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;

        let changed = conn
            .execute("DELETE FROM logs WHERE id = ?1", params![id])
            .map_err(|e| Error::Storage(format!("Failed to delete log: {}", e)))?;

        Ok(changed == 1)
    }
}
