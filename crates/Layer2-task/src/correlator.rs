//! Event Correlator - durable log lines tied to tasks and agents
//!
//! Recording never fails the caller: a sink error is reported through
//! `tracing` and the record is dropped.

use std::sync::Arc;
use tasktrack_foundation::{
    Clock, Error, LogLevel, LogQuery, LogRecord, LogSink, NewLogRecord, Result, TaskId,
};
use tracing::{debug, error, info, warn};

/// Event Correlator
pub struct EventCorrelator {
    sink: Arc<dyn LogSink>,
    source: String,
    clock: Arc<dyn Clock>,
}

impl EventCorrelator {
    pub fn new(sink: Arc<dyn LogSink>, source: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sink,
            source: source.into(),
            clock,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Append a log line, mirrored to `tracing`
    pub async fn record(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        task_id: Option<TaskId>,
        agent_id: Option<String>,
    ) {
        let message = message.into();
        mirror(level, &message, task_id);

        let mut record = NewLogRecord::new(level, message)
            .with_source(self.source.as_str())
            .with_agent(agent_id);
        record.created_at = self.clock.now();
        if let Some(id) = task_id {
            record = record.with_task(id);
        }

        if let Err(e) = self.sink.append(record).await {
            warn!(error = %e, "Failed to persist log record");
        }
    }

    pub async fn info(&self, message: impl Into<String>, task_id: TaskId, agent_id: Option<String>) {
        self.record(LogLevel::Info, message, Some(task_id), agent_id)
            .await
    }

    pub async fn warning(
        &self,
        message: impl Into<String>,
        task_id: TaskId,
        agent_id: Option<String>,
    ) {
        self.record(LogLevel::Warning, message, Some(task_id), agent_id)
            .await
    }

    pub async fn error(&self, message: impl Into<String>, task_id: TaskId, agent_id: Option<String>) {
        self.record(LogLevel::Error, message, Some(task_id), agent_id)
            .await
    }

    /// Stored records matching `query`, newest first
    pub async fn logs(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        self.sink.list(query).await
    }

    pub async fn log(&self, id: i64) -> Result<LogRecord> {
        self.sink
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Log {} not found", id)))
    }

    pub async fn delete_log(&self, id: i64) -> Result<()> {
        if self.sink.delete(id).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("Log {} not found", id)))
        }
    }
}

fn mirror(level: LogLevel, message: &str, task_id: Option<TaskId>) {
    let task = task_id.map(|id| id.to_string()).unwrap_or_default();
    match level {
        LogLevel::Debug => debug!(task_id = %task, "{}", message),
        LogLevel::Info => info!(task_id = %task, "{}", message),
        LogLevel::Warning => warn!(task_id = %task, "{}", message),
        LogLevel::Error => error!(task_id = %task, "{}", message),
    }
}
