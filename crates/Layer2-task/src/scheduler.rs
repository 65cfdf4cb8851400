//! Execution Scheduler - runs each task as an independent unit of work
//!
//! ```text
//! schedule(task) ──spawn──► [PENDING→RUNNING] ─► task_started
//!                                 │
//!                              Delay
//!                                 │
//!                 Executor (timeout + catch_unwind) ─► Outcome
//!                                 │
//!                 COMPLETED / FAILED ─► task_completed
//! ```
//!
//! A unit that loses a transition to someone else (a cancel, typically)
//! logs the conflict and stops; it never retries.

use crate::correlator::EventCorrelator;
use crate::event::LifecycleEvent;
use crate::executor::{Delay, ExecutionFault, Executor, Outcome, SimulatedExecutor, SleepDelay};
use crate::hub::BroadcastHub;
use crate::registry::TaskRegistry;
use crate::state::TransitionFields;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tasktrack_foundation::{Clock, Error, SchedulerConfig, Task, TaskId, TaskStatus};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

// ============================================================================
// ScheduleHandle
// ============================================================================

/// Completion handle for one scheduled task; dropping it detaches the work
#[derive(Debug)]
pub struct ScheduleHandle {
    task_id: TaskId,
    handle: JoinHandle<Option<Task>>,
}

impl ScheduleHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Final task snapshot, or `None` if the unit of work was aborted
    pub async fn wait(self) -> Option<Task> {
        match self.handle.await {
            Ok(task) => task,
            Err(e) => {
                error!(task_id = %self.task_id, error = %e, "Unit of work did not finish");
                None
            }
        }
    }
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// ExecutionScheduler
// ============================================================================

/// Execution Scheduler
#[derive(Clone)]
pub struct ExecutionScheduler {
    registry: Arc<TaskRegistry>,
    hub: BroadcastHub,
    correlator: Arc<EventCorrelator>,
    clock: Arc<dyn Clock>,
    executor: Arc<dyn Executor>,
    delay: Arc<dyn Delay>,
    execution_timeout: Duration,
    in_flight: Arc<AtomicUsize>,
}

impl ExecutionScheduler {
    /// Scheduler with the simulated executor and a real processing delay
    pub fn new(
        config: &SchedulerConfig,
        registry: Arc<TaskRegistry>,
        hub: BroadcastHub,
        correlator: Arc<EventCorrelator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            hub,
            correlator,
            clock,
            executor: Arc::new(SimulatedExecutor::new()),
            delay: Arc::new(SleepDelay::new(config.processing_delay())),
            execution_timeout: config.execution_timeout(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn executor_name(&self) -> &'static str {
        self.executor.name()
    }

    /// Units of work spawned and not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Spawn the unit of work for `task` and return immediately
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, task: Task) -> ScheduleHandle {
        let task_id = task.id;
        let guard = InFlight::enter(&self.in_flight);
        let this = self.clone();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            this.run(task).await
        });

        debug!(task_id = %task_id, executor = self.executor.name(), "Task scheduled");
        ScheduleHandle { task_id, handle }
    }

    async fn run(&self, task: Task) -> Option<Task> {
        let id = task.id;
        let agent = task.agent_id.clone();

        if !task.is_active() {
            debug!(task_id = %id, status = %task.status, "Task already finished, nothing to run");
            return Some(task);
        }

        let running = if task.status == TaskStatus::Pending {
            match self
                .registry
                .transition(id, TaskStatus::Running, TransitionFields::none())
                .await
            {
                Ok(running) => running,
                Err(e) => return self.abandon(id, agent, "start", e).await,
            }
        } else {
            task
        };

        self.hub
            .broadcast(&LifecycleEvent::started(&running, self.clock.now()).to_message())
            .await;
        self.correlator
            .info(
                format!("Task {} started: {}", id, running.command),
                id,
                agent.clone(),
            )
            .await;

        self.delay.wait().await;

        let outcome = self.execute(&running).await;

        let fields = match &outcome {
            Ok(output) => TransitionFields::result(output.clone()),
            Err(fault) => TransitionFields::error(fault.message.clone()),
        };
        let target = if outcome.is_ok() {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };

        let finished = match self.registry.transition(id, target, fields).await {
            Ok(finished) => finished,
            Err(e) => return self.abandon(id, agent, "finish", e).await,
        };

        self.hub
            .broadcast(&LifecycleEvent::completed(&finished, self.clock.now()).to_message())
            .await;

        match outcome {
            Ok(_) => {
                self.correlator
                    .info(format!("Task {} completed successfully", id), id, agent)
                    .await
            }
            Err(fault) => {
                self.correlator
                    .error(format!("Task {} failed: {}", id, fault), id, agent)
                    .await
            }
        }

        Some(finished)
    }

    /// Run the executor, turning errors, panics and overruns into faults
    async fn execute(&self, task: &Task) -> Outcome {
        let run = AssertUnwindSafe(self.executor.execute(task)).catch_unwind();

        match tokio::time::timeout(self.execution_timeout, run).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(Error::ExecutionFault(message)))) => Err(ExecutionFault::error(message)),
            Ok(Ok(Err(e))) => Err(ExecutionFault::error(e.to_string())),
            Ok(Err(payload)) => Err(ExecutionFault::panic(payload)),
            Err(_) => Err(ExecutionFault::timeout(self.execution_timeout)),
        }
    }

    async fn abandon(
        &self,
        id: TaskId,
        agent: Option<String>,
        stage: &'static str,
        err: Error,
    ) -> Option<Task> {
        if err.is_conflict() {
            warn!(task_id = %id, stage, error = %err, "Transition lost, leaving task as is");
            self.correlator
                .warning(format!("Task {} {} skipped: {}", id, stage, err), id, agent)
                .await;
            self.registry.get(id).await.ok()
        } else {
            error!(task_id = %id, stage, error = %err, "Unit of work aborted");
            self.correlator
                .error(format!("Task {} {} aborted: {}", id, stage, err), id, agent)
                .await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NoDelay;
    use crate::hub::ChannelSink;
    use async_trait::async_trait;
    use serde_json::Value;
    use tasktrack_foundation::{
        HubConfig, LogLevel, LogQuery, MemoryStore, Result, SystemClock,
    };
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::Semaphore;

    /// Holds every unit of work until the test opens the gate
    struct GatedDelay(Semaphore);

    impl GatedDelay {
        fn new() -> Arc<Self> {
            Arc::new(Self(Semaphore::new(0)))
        }

        fn open(&self) {
            self.0.add_permits(1);
        }
    }

    #[async_trait]
    impl Delay for GatedDelay {
        async fn wait(&self) {
            if let Ok(permit) = self.0.acquire().await {
                permit.forget();
            }
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl Executor for FailingExecutor {
        async fn execute(&self, _task: &Task) -> Result<String> {
            Err(Error::ExecutionFault("exit status 2".into()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl Executor for PanickingExecutor {
        async fn execute(&self, _task: &Task) -> Result<String> {
            panic!("executor blew up");
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    struct HangingExecutor;

    #[async_trait]
    impl Executor for HangingExecutor {
        async fn execute(&self, _task: &Task) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".into())
        }

        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    struct Harness {
        registry: Arc<TaskRegistry>,
        correlator: Arc<EventCorrelator>,
        scheduler: ExecutionScheduler,
        events: UnboundedReceiver<String>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = Arc::new(TaskRegistry::new(store.clone(), clock.clone()));
        let correlator = Arc::new(EventCorrelator::new(store, "task_executor", clock.clone()));
        let hub = BroadcastHub::new(&HubConfig::default());
        let (sink, events) = ChannelSink::pair("test");
        hub.connect(Arc::new(sink));

        let scheduler = ExecutionScheduler::new(
            &SchedulerConfig::default(),
            registry.clone(),
            hub,
            correlator.clone(),
            clock,
        )
        .with_delay(Arc::new(NoDelay));

        Harness {
            registry,
            correlator,
            scheduler,
            events,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_pending_task_runs_to_completion() {
        let mut h = harness();
        let task = h.registry.create("t1", "echo hi", None).await.unwrap();

        let done = h.scheduler.schedule(task.clone()).wait().await.unwrap();

        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.result.as_deref(), Some("Executed: echo hi"));
        assert!(done.check_invariants().is_ok());
        assert_eq!(h.scheduler.in_flight(), 0);

        let events = drain(&mut h.events);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "task_started");
        assert_eq!(events[1]["event"], "task_completed");
        assert_eq!(events[1]["result"], "Executed: echo hi");

        let logs = h
            .correlator
            .logs(&LogQuery::new().with_task(task.id))
            .await
            .unwrap();
        let messages: Vec<&str> = logs.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                format!("Task {} completed successfully", task.id),
                format!("Task {} started: echo hi", task.id),
            ]
        );
    }

    #[tokio::test]
    async fn test_running_task_still_announces_start() {
        let mut h = harness();
        let task = h.registry.create_running("t1", "noop", None).await.unwrap();

        let done = h.scheduler.schedule(task).wait().await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(drain(&mut h.events)[0]["event"], "task_started");
    }

    #[tokio::test]
    async fn test_finished_task_is_returned_untouched() {
        let mut h = harness();
        let task = h.registry.create_running("t1", "noop", None).await.unwrap();
        let cancelled = h
            .registry
            .transition(task.id, TaskStatus::Cancelled, TransitionFields::none())
            .await
            .unwrap();

        let handle = h.scheduler.schedule(cancelled.clone());
        assert_eq!(handle.task_id(), task.id);
        assert!(format!("{:?}", handle).contains(&task.id.to_string()));

        assert_eq!(handle.wait().await, Some(cancelled));
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn test_executor_error_fails_task() {
        let h = harness();
        let scheduler = h.scheduler.clone().with_executor(Arc::new(FailingExecutor));
        let task = h.registry.create("t1", "false", None).await.unwrap();

        let done = scheduler.schedule(task.clone()).wait().await.unwrap();

        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("exit status 2"));
        assert!(done.result.is_none());

        let errors = h
            .correlator
            .logs(&LogQuery::new().with_level(LogLevel::Error))
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("exit status 2"));
    }

    #[tokio::test]
    async fn test_executor_panic_fails_task() {
        let h = harness();
        let scheduler = h.scheduler.clone().with_executor(Arc::new(PanickingExecutor));
        let task = h.registry.create("t1", "boom", None).await.unwrap();

        let done = scheduler.schedule(task).wait().await.unwrap();

        assert_eq!(done.status, TaskStatus::Failed);
        assert!(done.error.unwrap().contains("executor blew up"));
    }

    #[tokio::test]
    async fn test_executor_timeout_fails_task() {
        let h = harness();
        let scheduler = h
            .scheduler
            .clone()
            .with_executor(Arc::new(HangingExecutor))
            .with_execution_timeout(Duration::from_millis(20));
        let task = h.registry.create("t1", "sleep", None).await.unwrap();

        let done = scheduler.schedule(task).wait().await.unwrap();

        assert_eq!(done.status, TaskStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("timed out after 20ms"));
    }

    #[tokio::test]
    async fn test_cancel_during_delay_is_swallowed() {
        let mut h = harness();
        let gate = GatedDelay::new();
        let scheduler = h.scheduler.clone().with_delay(gate.clone());
        let task = h.registry.create("t1", "noop", None).await.unwrap();

        let handle = scheduler.schedule(task.clone());

        // Wait for the unit to reach the delay
        while h.registry.get(task.id).await.unwrap().status != TaskStatus::Running {
            tokio::task::yield_now().await;
        }
        h.registry
            .transition(task.id, TaskStatus::Cancelled, TransitionFields::none())
            .await
            .unwrap();
        gate.open();

        let final_task = handle.wait().await.unwrap();
        assert_eq!(final_task.status, TaskStatus::Cancelled);
        assert!(final_task.result.is_none());

        let events = drain(&mut h.events);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event"], "task_started");

        let warnings = h
            .correlator
            .logs(&LogQuery::new().with_level(LogLevel::Warning))
            .await
            .unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_units_run_in_parallel() {
        let h = harness();
        let gate = GatedDelay::new();
        let scheduler = h.scheduler.clone().with_delay(gate.clone());

        let mut handles = Vec::new();
        for i in 0..10 {
            let task = h
                .registry
                .create(format!("t{}", i), "noop", None)
                .await
                .unwrap();
            handles.push(scheduler.schedule(task));
        }

        // All ten are parked in the delay at once
        while h
            .registry
            .list(0, 100)
            .await
            .unwrap()
            .iter()
            .any(|t| t.status != TaskStatus::Running)
        {
            tokio::task::yield_now().await;
        }
        assert_eq!(scheduler.in_flight(), 10);

        for _ in 0..10 {
            gate.open();
        }
        for handle in handles {
            assert_eq!(handle.wait().await.unwrap().status, TaskStatus::Completed);
        }
        assert_eq!(scheduler.in_flight(), 0);
    }
}
