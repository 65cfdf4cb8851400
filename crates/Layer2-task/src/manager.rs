//! Task Manager - the entry point callers use
//!
//! Wires the registry, scheduler, hub and correlator together and exposes
//! the request-level operations:
//! - Task submission (`execute`, `create` + `start`, `submit`)
//! - Task queries and cancellation
//! - Observer connect/disconnect and acknowledgements
//! - Agent directory
//! - Log queries

use crate::agents::AgentRegistry;
use crate::correlator::EventCorrelator;
use crate::event::LifecycleEvent;
use crate::executor::{Delay, Executor, SimulatedExecutor, SleepDelay};
use crate::hub::{BroadcastHub, ObserverId, ObserverSink};
use crate::registry::TaskRegistry;
use crate::scheduler::{ExecutionScheduler, ScheduleHandle};
use crate::state::TransitionFields;
use serde_json::{json, Value};
use std::sync::Arc;
use tasktrack_foundation::{
    Agent, AgentStore, Clock, Error, LogLevel, LogQuery, LogRecord, LogSink, MemoryStore, Result,
    SystemClock, Task, TaskId, TaskStatus, TaskStore, TrackerConfig,
};
use tracing::{debug, info};

/// Upper bound for any page size a caller asks for
pub const MAX_LIST_LIMIT: usize = 1000;

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`TaskManager`]; unset collaborators get in-process defaults
pub struct TaskManagerBuilder {
    config: TrackerConfig,
    task_store: Option<Arc<dyn TaskStore>>,
    agent_store: Option<Arc<dyn AgentStore>>,
    log_sink: Option<Arc<dyn LogSink>>,
    executor: Option<Arc<dyn Executor>>,
    delay: Option<Arc<dyn Delay>>,
    clock: Option<Arc<dyn Clock>>,
}

impl TaskManagerBuilder {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            task_store: None,
            agent_store: None,
            log_sink: None,
            executor: None,
            delay: None,
            clock: None,
        }
    }

    /// Use one backend for tasks, agents and logs
    pub fn store<S>(mut self, store: Arc<S>) -> Self
    where
        S: TaskStore + AgentStore + LogSink + 'static,
    {
        self.task_store = Some(store.clone() as Arc<dyn TaskStore>);
        self.agent_store = Some(store.clone() as Arc<dyn AgentStore>);
        self.log_sink = Some(store as Arc<dyn LogSink>);
        self
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    pub fn agent_store(mut self, store: Arc<dyn AgentStore>) -> Self {
        self.agent_store = Some(store);
        self
    }

    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<TaskManager> {
        self.config.validate()?;

        let memory = Arc::new(MemoryStore::new());
        let task_store = self
            .task_store
            .unwrap_or_else(|| memory.clone() as Arc<dyn TaskStore>);
        let agent_store = self
            .agent_store
            .unwrap_or_else(|| memory.clone() as Arc<dyn AgentStore>);
        let log_sink = self.log_sink.unwrap_or(memory as Arc<dyn LogSink>);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(SimulatedExecutor::new()) as Arc<dyn Executor>);
        let processing_delay = self.config.scheduler.processing_delay();
        let delay = self
            .delay
            .unwrap_or_else(|| Arc::new(SleepDelay::new(processing_delay)) as Arc<dyn Delay>);

        let registry = Arc::new(TaskRegistry::new(task_store.clone(), clock.clone()));
        let agents = Arc::new(AgentRegistry::new(agent_store, clock.clone()));
        let hub = BroadcastHub::new(&self.config.hub);
        let correlator = Arc::new(EventCorrelator::new(
            log_sink,
            self.config.logging.source.clone(),
            clock.clone(),
        ));
        let scheduler = ExecutionScheduler::new(
            &self.config.scheduler,
            registry.clone(),
            hub.clone(),
            correlator.clone(),
            clock.clone(),
        )
        .with_executor(executor)
        .with_delay(delay);

        info!(
            store = task_store.name(),
            executor = scheduler.executor_name(),
            "Task manager ready"
        );

        Ok(TaskManager {
            registry,
            agents,
            scheduler,
            hub,
            correlator,
            clock,
            config: Arc::new(self.config),
        })
    }
}

// ============================================================================
// TaskManager
// ============================================================================

/// Task Manager - handles task lifecycle, observers and logs
#[derive(Clone)]
pub struct TaskManager {
    registry: Arc<TaskRegistry>,
    agents: Arc<AgentRegistry>,
    scheduler: ExecutionScheduler,
    hub: BroadcastHub,
    correlator: Arc<EventCorrelator>,
    clock: Arc<dyn Clock>,
    config: Arc<TrackerConfig>,
}

impl TaskManager {
    pub fn builder(config: TrackerConfig) -> TaskManagerBuilder {
        TaskManagerBuilder::new(config)
    }

    /// In-memory manager with default configuration
    pub fn in_memory() -> Result<Self> {
        Self::builder(TrackerConfig::default()).build()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn correlator(&self) -> &Arc<EventCorrelator> {
        &self.correlator
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Create a RUNNING task named after the current time and schedule it
    pub async fn execute(
        &self,
        command: impl Into<String>,
        agent_id: Option<String>,
    ) -> Result<(Task, ScheduleHandle)> {
        let command = non_empty("command", command.into())?;
        let name = format!("task-{}", self.clock.now().format("%Y%m%d%H%M%S"));

        let task = self.registry.create_running(name, command, agent_id).await?;
        let handle = self.scheduler.schedule(task.clone());
        Ok((task, handle))
    }

    /// Create a PENDING task; it runs only once `start` is called
    pub async fn create(
        &self,
        name: impl Into<String>,
        command: impl Into<String>,
        agent_id: Option<String>,
    ) -> Result<Task> {
        let name = non_empty("name", name.into())?;
        let command = non_empty("command", command.into())?;

        let task = self.registry.create(name, command, agent_id).await?;
        self.correlator
            .record(
                LogLevel::Debug,
                format!("Task {} created: {}", task.id, task.command),
                Some(task.id),
                task.agent_id.clone(),
            )
            .await;
        Ok(task)
    }

    /// Move a PENDING task to RUNNING and schedule it
    ///
    /// Of several concurrent callers exactly one succeeds; the rest see
    /// `Error::Conflict`.
    pub async fn start(&self, id: TaskId) -> Result<ScheduleHandle> {
        let running = self
            .registry
            .transition(id, TaskStatus::Running, TransitionFields::none())
            .await?;
        Ok(self.scheduler.schedule(running))
    }

    /// Create and immediately schedule
    pub async fn submit(
        &self,
        name: impl Into<String>,
        command: impl Into<String>,
        agent_id: Option<String>,
    ) -> Result<(Task, ScheduleHandle)> {
        let task = self.create(name, command, agent_id).await?;
        let handle = self.scheduler.schedule(task.clone());
        Ok((task, handle))
    }

    /// Cancel a RUNNING task and announce it as completed with status `cancelled`
    pub async fn cancel(&self, id: TaskId) -> Result<Task> {
        let cancelled = self
            .registry
            .transition(id, TaskStatus::Cancelled, TransitionFields::none())
            .await?;

        self.hub
            .broadcast(&LifecycleEvent::completed(&cancelled, self.clock.now()).to_message())
            .await;
        self.correlator
            .warning(
                format!("Task {} cancelled", id),
                id,
                cancelled.agent_id.clone(),
            )
            .await;
        Ok(cancelled)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn get(&self, id: TaskId) -> Result<Task> {
        self.registry.get(id).await
    }

    /// Page of tasks by creation order; `limit` defaults to the configured page size
    pub async fn list(&self, skip: usize, limit: Option<usize>) -> Result<Vec<Task>> {
        let limit = self.page_size(limit);
        self.registry.list(skip, limit).await
    }

    /// Units of work currently in flight
    pub fn running_count(&self) -> usize {
        self.scheduler.in_flight()
    }

    // ------------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------------

    pub fn connect(&self, sink: Arc<dyn ObserverSink>) -> ObserverId {
        self.hub.connect(sink)
    }

    pub fn disconnect(&self, id: ObserverId) -> bool {
        self.hub.disconnect(id)
    }

    /// Answer an inbound observer message with `{"event":"ack","data":...}`
    pub async fn acknowledge(&self, id: ObserverId, data: Value) -> bool {
        debug!(observer = %id, "Acknowledging observer message");
        self.hub
            .send_personal(id, &json!({ "event": "ack", "data": data }))
            .await
    }

    // ------------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------------

    pub async fn register_agent(
        &self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Agent> {
        let agent = self.agents.register(name, description).await?;
        self.correlator
            .record(
                LogLevel::Info,
                format!("Agent {} registered: {}", agent.id, agent.name),
                None,
                Some(agent.id.to_string()),
            )
            .await;
        Ok(agent)
    }

    pub async fn agent(&self, id: i64) -> Result<Agent> {
        self.agents.get(id).await
    }

    /// Page of agents by id; `limit` defaults to the configured page size
    pub async fn agents(&self, skip: usize, limit: Option<usize>) -> Result<Vec<Agent>> {
        let limit = self.page_size(limit);
        self.agents.list(skip, limit).await
    }

    pub async fn heartbeat(&self, id: i64) -> Result<Agent> {
        self.agents.heartbeat(id).await
    }

    pub async fn remove_agent(&self, id: i64) -> Result<()> {
        self.agents.remove(id).await?;
        self.correlator
            .record(
                LogLevel::Info,
                format!("Agent {} removed", id),
                None,
                Some(id.to_string()),
            )
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------------

    pub async fn logs(&self, mut query: LogQuery) -> Result<Vec<LogRecord>> {
        query.limit = query.limit.min(MAX_LIST_LIMIT);
        self.correlator.logs(&query).await
    }

    pub async fn log(&self, id: i64) -> Result<LogRecord> {
        self.correlator.log(id).await
    }

    pub async fn delete_log(&self, id: i64) -> Result<()> {
        self.correlator.delete_log(id).await
    }

    fn page_size(&self, limit: Option<usize>) -> usize {
        limit
            .unwrap_or(self.config.storage.default_list_limit)
            .min(MAX_LIST_LIMIT)
    }
}

fn non_empty(field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        Err(Error::InvalidInput(format!("{} cannot be empty", field)))
    } else {
        Ok(value)
    }
}
