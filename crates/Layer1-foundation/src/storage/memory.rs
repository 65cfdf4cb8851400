//! In-memory storage - tasks, agents and logs kept in process

use crate::core::{
    Agent, AgentStore, LogQuery, LogRecord, LogSink, NewAgent, NewLogRecord, Task, TaskId,
    TaskStatus, TaskStore,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct TaskTable {
    by_id: HashMap<TaskId, Task>,
    /// Insertion order, used for listing
    order: Vec<TaskId>,
}

#[derive(Default)]
struct AgentTable {
    by_id: BTreeMap<i64, Agent>,
    next_id: i64,
}

#[derive(Default)]
struct LogTable {
    records: Vec<LogRecord>,
    next_id: i64,
}

/// Volatile store for tests and one-shot runs
#[derive(Default)]
pub struct MemoryStore {
    tasks: RwLock<TaskTable>,
    agents: RwLock<AgentTable>,
    logs: RwLock<LogTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn task_count(&self) -> usize {
        self.tasks.read().await.order.len()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert(&self, task: &Task) -> Result<()> {
        let mut table = self.tasks.write().await;
        if table.by_id.insert(task.id, task.clone()).is_none() {
            table.order.push(task.id);
        }
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.by_id.get(&id).cloned())
    }

    async fn list(&self, skip: usize, limit: usize) -> Result<Vec<Task>> {
        let table = self.tasks.read().await;
        Ok(table
            .order
            .iter()
            .skip(skip)
            .take(limit)
            .filter_map(|id| table.by_id.get(id).cloned())
            .collect())
    }

    async fn update_if_status(&self, task: &Task, expected: TaskStatus) -> Result<bool> {
        let mut table = self.tasks.write().await;
        match table.by_id.get_mut(&task.id) {
            Some(stored) if stored.status == expected => {
                *stored = task.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn insert_agent(&self, agent: NewAgent) -> Result<Agent> {
        let mut table = self.agents.write().await;
        if table.by_id.values().any(|a| a.name == agent.name) {
            return Err(Error::InvalidInput("Agent name already exists".into()));
        }
        table.next_id += 1;
        let agent = Agent::from_new(table.next_id, agent);
        table.by_id.insert(agent.id, agent.clone());
        Ok(agent)
    }

    async fn get_agent(&self, id: i64) -> Result<Option<Agent>> {
        Ok(self.agents.read().await.by_id.get(&id).cloned())
    }

    async fn list_agents(&self, skip: usize, limit: usize) -> Result<Vec<Agent>> {
        let table = self.agents.read().await;
        Ok(table.by_id.values().skip(skip).take(limit).cloned().collect())
    }

    async fn heartbeat(&self, id: i64, at: DateTime<Utc>) -> Result<Option<Agent>> {
        let mut table = self.agents.write().await;
        Ok(table.by_id.get_mut(&id).map(|agent| {
            agent.beat(at);
            agent.clone()
        }))
    }

    async fn delete_agent(&self, id: i64) -> Result<bool> {
        Ok(self.agents.write().await.by_id.remove(&id).is_some())
    }
}

#[async_trait]
impl LogSink for MemoryStore {
    async fn append(&self, record: NewLogRecord) -> Result<i64> {
        let mut table = self.logs.write().await;
        table.next_id += 1;
        let id = table.next_id;
        table.records.push(LogRecord::from_new(id, record));
        Ok(id)
    }

    async fn list(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        let table = self.logs.read().await;
        Ok(table
            .records
            .iter()
            .rev()
            .filter(|r| query.matches(r))
            .skip(query.skip)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<LogRecord>> {
        let table = self.logs.read().await;
        Ok(table.records.iter().find(|r| r.id == id).cloned())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut table = self.logs.write().await;
        let before = table.records.len();
        table.records.retain(|r| r.id != id);
        Ok(table.records.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgentStatus, LogLevel};

    #[tokio::test]
    async fn test_conditional_update() {
        let store = MemoryStore::new();
        let task = Task::pending("t1", "noop", None, Utc::now());
        store.insert(&task).await.unwrap();

        let mut running = task.clone();
        running.status = TaskStatus::Running;
        running.started_at = Some(Utc::now());

        assert!(store.update_if_status(&running, TaskStatus::Pending).await.unwrap());
        // Stored status is now running, a second pending-guarded write is rejected
        assert!(!store.update_if_status(&running, TaskStatus::Pending).await.unwrap());

        let stored = TaskStore::get(&store, task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let task = Task::pending(format!("t{}", i), "noop", None, Utc::now());
            ids.push(task.id);
            store.insert(&task).await.unwrap();
        }

        let page: Vec<TaskId> = TaskStore::list(&store, 1, 3)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(page, ids[1..4].to_vec());
        assert_eq!(store.task_count().await, 5);
    }

    #[tokio::test]
    async fn test_logs_newest_first_and_delete() {
        let store = MemoryStore::new();
        let first = store
            .append(NewLogRecord::new(LogLevel::Info, "one"))
            .await
            .unwrap();
        store
            .append(NewLogRecord::new(LogLevel::Error, "two"))
            .await
            .unwrap();

        let all = LogSink::list(&store, &LogQuery::new()).await.unwrap();
        assert_eq!(all[0].message, "two");
        assert_eq!(all[1].message, "one");

        assert!(store.delete(first).await.unwrap());
        assert!(!store.delete(first).await.unwrap());
        assert!(LogSink::get(&store, first).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_agent_names_are_unique() {
        let store = MemoryStore::new();
        let first = store
            .insert_agent(NewAgent::new("builder", None, Utc::now()))
            .await
            .unwrap();
        assert_eq!(first.id, 1);

        let err = store
            .insert_agent(NewAgent::new("builder", Some("again".into()), Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m == "Agent name already exists"));

        // The id sequence only advances on success
        let second = store
            .insert_agent(NewAgent::new("reviewer", None, Utc::now()))
            .await
            .unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(store.list_agents(0, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_agent_heartbeat_and_delete() {
        let store = MemoryStore::new();
        let agent = store
            .insert_agent(NewAgent::new("builder", None, Utc::now()))
            .await
            .unwrap();

        let beat = store.heartbeat(agent.id, Utc::now()).await.unwrap().unwrap();
        assert_eq!(beat.status, AgentStatus::Active);
        assert_eq!(store.get_agent(agent.id).await.unwrap(), Some(beat));

        assert!(store.delete_agent(agent.id).await.unwrap());
        assert!(!store.delete_agent(agent.id).await.unwrap());
        assert!(store.heartbeat(agent.id, Utc::now()).await.unwrap().is_none());
    }
}
