//! Task Registry - owns task records and enforces the lifecycle
//!
//! Transitions on one task id are linearized by a per-id async lock, so two
//! racing callers see each other's post-state. Different ids never contend
//! beyond the short lock-table lookup. The store's status-guarded update is a
//! second line of defence against writers outside this process.

use crate::state::{apply_transition, TransitionFields};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tasktrack_foundation::{Clock, Error, Result, Task, TaskId, TaskStatus, TaskStore};
use tracing::debug;

/// Task Registry
pub struct TaskRegistry {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,

    /// Per-task transition locks
    locks: Mutex<HashMap<TaskId, Arc<tokio::sync::Mutex<()>>>>,
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a task in PENDING
    pub async fn create(
        &self,
        name: impl Into<String>,
        command: impl Into<String>,
        agent_id: Option<String>,
    ) -> Result<Task> {
        let task = Task::pending(name, command, agent_id, self.clock.now());
        self.insert(&task).await?;
        debug!(task_id = %task.id, name = %task.name, "Task created (pending)");
        Ok(task)
    }

    /// Create a task directly in RUNNING, for callers that dispatch immediately
    pub async fn create_running(
        &self,
        name: impl Into<String>,
        command: impl Into<String>,
        agent_id: Option<String>,
    ) -> Result<Task> {
        let task = Task::running(name, command, agent_id, self.clock.now());
        self.insert(&task).await?;
        debug!(task_id = %task.id, name = %task.name, "Task created (running)");
        Ok(task)
    }

    async fn insert(&self, task: &Task) -> Result<()> {
        if !task.status.is_initial() {
            return Err(Error::Internal(format!(
                "Task {} cannot be created as {}",
                task.id, task.status
            )));
        }
        self.store.insert(task).await
    }

    pub async fn get(&self, id: TaskId) -> Result<Task> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Task {} not found", id)))
    }

    pub async fn list(&self, skip: usize, limit: usize) -> Result<Vec<Task>> {
        self.store.list(skip, limit).await
    }

    /// Move a task to `to`, atomically with respect to other callers on the same id
    pub async fn transition(
        &self,
        id: TaskId,
        to: TaskStatus,
        fields: TransitionFields,
    ) -> Result<Task> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let current = match self.store.get(id).await? {
            Some(task) => task,
            None => {
                self.release(id);
                return Err(Error::NotFound(format!("Task {} not found", id)));
            }
        };

        let next = match apply_transition(&current, to, fields, self.clock.now()) {
            Ok(next) => next,
            Err(e) => {
                if current.status.is_terminal() {
                    self.release(id);
                }
                return Err(e);
            }
        };

        if !self.store.update_if_status(&next, current.status).await? {
            // The stored row moved without going through this registry
            let latest = self.store.get(id).await?;
            if latest.as_ref().map_or(true, |t| t.status.is_terminal()) {
                self.release(id);
            }
            return match latest {
                Some(latest) => Err(Error::conflict(id, latest.status, to)),
                None => Err(Error::NotFound(format!("Task {} not found", id))),
            };
        }

        debug!(task_id = %id, from = %current.status, to = %to, "Task transitioned");

        if to.is_terminal() {
            self.release(id);
        }

        Ok(next)
    }

    /// Drop the lock entry for an id that can never transition again
    fn release(&self, id: TaskId) {
        self.locks.lock().remove(&id);
    }

    fn lock_for(&self, id: TaskId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(id).or_default())
    }

    /// Number of tasks with a live transition lock
    pub fn tracked_locks(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tasktrack_foundation::{MemoryStore, SystemClock};

    fn registry() -> TaskRegistry {
        TaskRegistry::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_create_is_pending() {
        let registry = registry();
        let task = registry.create("t1", "noop", None).await.unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(registry.get(task.id).await.unwrap(), task);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let registry = registry();
        let err = registry.get(TaskId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_full_path_and_terminal_immutability() {
        let registry = registry();
        let task = registry.create("t1", "noop", Some("agent-1".into())).await.unwrap();

        registry
            .transition(task.id, TaskStatus::Running, TransitionFields::none())
            .await
            .unwrap();
        let done = registry
            .transition(
                task.id,
                TaskStatus::Completed,
                TransitionFields::result("Executed: noop"),
            )
            .await
            .unwrap();
        assert!(done.check_invariants().is_ok());
        assert_eq!(registry.tracked_locks(), 0);

        let err = registry
            .transition(task.id, TaskStatus::Failed, TransitionFields::error("late"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // Rejected transition left the record untouched
        assert_eq!(registry.get(task.id).await.unwrap(), done);
    }

    #[tokio::test]
    async fn test_transition_unknown_is_not_found() {
        let registry = registry();
        let err = registry
            .transition(TaskId::new(), TaskStatus::Running, TransitionFields::none())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rejected_transitions_do_not_leak_locks() {
        let registry = registry();

        for _ in 0..50 {
            let err = registry
                .transition(TaskId::new(), TaskStatus::Running, TransitionFields::none())
                .await
                .unwrap_err();
            assert!(err.is_not_found());
        }
        assert_eq!(registry.tracked_locks(), 0);

        let task = registry.create_running("t", "noop", None).await.unwrap();
        registry
            .transition(task.id, TaskStatus::Cancelled, TransitionFields::none())
            .await
            .unwrap();
        for _ in 0..5 {
            let err = registry
                .transition(task.id, TaskStatus::Completed, TransitionFields::result("late"))
                .await
                .unwrap_err();
            assert!(err.is_conflict());
        }
        assert_eq!(registry.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_illegal_edge_on_live_task_keeps_lock() {
        let registry = registry();
        let task = registry.create("t", "noop", None).await.unwrap();

        let err = registry
            .transition(task.id, TaskStatus::Completed, TransitionFields::result("x"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(registry.tracked_locks(), 1);

        registry
            .transition(task.id, TaskStatus::Running, TransitionFields::none())
            .await
            .unwrap();
        registry
            .transition(task.id, TaskStatus::Failed, TransitionFields::error("boom"))
            .await
            .unwrap();
        assert_eq!(registry.tracked_locks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_start_has_one_winner() {
        let registry = Arc::new(registry());

        for _ in 0..20 {
            let id = registry.create("race", "noop", None).await.unwrap().id;

            let a = {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry
                        .transition(id, TaskStatus::Running, TransitionFields::none())
                        .await
                })
            };
            let b = {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry
                        .transition(id, TaskStatus::Running, TransitionFields::none())
                        .await
                })
            };

            let results = [a.await.unwrap(), b.await.unwrap()];
            let wins = results.iter().filter(|r| r.is_ok()).count();
            let conflicts = results
                .iter()
                .filter(|r| matches!(r, Err(e) if e.is_conflict()))
                .count();

            assert_eq!((wins, conflicts), (1, 1));

            let stored = registry.get(id).await.unwrap();
            assert_eq!(stored.status, TaskStatus::Running);
            assert!(stored.check_invariants().is_ok());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_terminal_transitions() {
        let registry = Arc::new(registry());
        let id = registry.create_running("race", "noop", None).await.unwrap().id;

        let complete = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .transition(id, TaskStatus::Completed, TransitionFields::result("ok"))
                    .await
            })
        };
        let cancel = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .transition(id, TaskStatus::Cancelled, TransitionFields::none())
                    .await
            })
        };

        let (complete, cancel) = (complete.await.unwrap(), cancel.await.unwrap());
        assert!(complete.is_ok() ^ cancel.is_ok());

        let stored = registry.get(id).await.unwrap();
        assert!(stored.status.is_terminal());
        assert!(stored.check_invariants().is_ok());
        if stored.status == TaskStatus::Cancelled {
            assert!(stored.result.is_none());
        }
    }

    /// Store whose conditional writes always lose, as if another process won
    struct LosingStore(MemoryStore);

    #[async_trait]
    impl TaskStore for LosingStore {
        async fn insert(&self, task: &Task) -> Result<()> {
            self.0.insert(task).await
        }

        async fn get(&self, id: TaskId) -> Result<Option<Task>> {
            TaskStore::get(&self.0, id).await
        }

        async fn list(&self, skip: usize, limit: usize) -> Result<Vec<Task>> {
            TaskStore::list(&self.0, skip, limit).await
        }

        async fn update_if_status(&self, _task: &Task, _expected: TaskStatus) -> Result<bool> {
            Ok(false)
        }

        fn name(&self) -> &'static str {
            "losing"
        }
    }

    #[tokio::test]
    async fn test_store_guard_reports_conflict() {
        let registry = TaskRegistry::new(
            Arc::new(LosingStore(MemoryStore::new())),
            Arc::new(SystemClock),
        );
        let task = registry.create("t", "noop", None).await.unwrap();

        let err = registry
            .transition(task.id, TaskStatus::Running, TransitionFields::none())
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    /// Store that is unreachable for every operation
    struct DownStore;

    #[async_trait]
    impl TaskStore for DownStore {
        async fn insert(&self, _task: &Task) -> Result<()> {
            Err(Error::Storage("database unavailable".into()))
        }

        async fn get(&self, _id: TaskId) -> Result<Option<Task>> {
            Err(Error::Storage("database unavailable".into()))
        }

        async fn list(&self, _skip: usize, _limit: usize) -> Result<Vec<Task>> {
            Err(Error::Storage("database unavailable".into()))
        }

        async fn update_if_status(&self, _task: &Task, _expected: TaskStatus) -> Result<bool> {
            Err(Error::Storage("database unavailable".into()))
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let registry = TaskRegistry::new(Arc::new(DownStore), Arc::new(SystemClock));
        let err = registry.create("t", "noop", None).await.unwrap_err();
        assert!(err.is_storage());
    }
}
