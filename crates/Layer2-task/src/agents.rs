//! Agent Registry - the directory of executors tasks may be attributed to
//!
//! Agents are looked up by their store-assigned numeric id. Tasks carry the
//! id as an opaque string and are never checked against this directory.

use std::sync::Arc;
use tasktrack_foundation::{Agent, AgentStore, Clock, Error, NewAgent, Result};
use tracing::debug;

/// Longest accepted agent name, in characters
pub const MAX_AGENT_NAME: usize = 100;

pub struct AgentRegistry {
    store: Arc<dyn AgentStore>,
    clock: Arc<dyn Clock>,
}

impl AgentRegistry {
    pub fn new(store: Arc<dyn AgentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Register a new agent in `inactive` status
    pub async fn register(
        &self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Agent> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("name cannot be empty".into()));
        }
        if name.chars().count() > MAX_AGENT_NAME {
            return Err(Error::InvalidInput(format!(
                "name cannot exceed {} characters",
                MAX_AGENT_NAME
            )));
        }

        let agent = self
            .store
            .insert_agent(NewAgent::new(name, description, self.clock.now()))
            .await?;
        debug!(agent_id = agent.id, name = %agent.name, "Agent registered");
        Ok(agent)
    }

    pub async fn get(&self, id: i64) -> Result<Agent> {
        self.store
            .get_agent(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn list(&self, skip: usize, limit: usize) -> Result<Vec<Agent>> {
        self.store.list_agents(skip, limit).await
    }

    /// Mark the agent active as of now
    pub async fn heartbeat(&self, id: i64) -> Result<Agent> {
        let agent = self
            .store
            .heartbeat(id, self.clock.now())
            .await?
            .ok_or_else(|| not_found(id))?;
        debug!(agent_id = id, "Agent heartbeat");
        Ok(agent)
    }

    pub async fn remove(&self, id: i64) -> Result<()> {
        if !self.store.delete_agent(id).await? {
            return Err(not_found(id));
        }
        debug!(agent_id = id, "Agent removed");
        Ok(())
    }
}

fn not_found(id: i64) -> Error {
    Error::NotFound(format!("Agent {} not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use parking_lot::Mutex;
    use tasktrack_foundation::{AgentStatus, MemoryStore};

    /// Clock the test moves by hand
    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(secs: i64) -> Arc<Self> {
            Arc::new(Self(Mutex::new(Utc.timestamp_opt(secs, 0).unwrap())))
        }

        fn advance(&self, secs: i64) {
            let mut now = self.0.lock();
            *now += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock()
        }
    }

    fn registry(clock: Arc<ManualClock>) -> AgentRegistry {
        AgentRegistry::new(Arc::new(MemoryStore::new()), clock)
    }

    #[tokio::test]
    async fn test_register_and_heartbeat() {
        let clock = ManualClock::at(1_700_000_000);
        let agents = registry(clock.clone());

        let agent = agents
            .register("builder", Some("runs builds".into()))
            .await
            .unwrap();
        assert_eq!(agent.status, AgentStatus::Inactive);
        assert!(agent.last_heartbeat.is_none());

        clock.advance(30);
        let beat = agents.heartbeat(agent.id).await.unwrap();
        assert_eq!(beat.status, AgentStatus::Active);
        assert_eq!(beat.last_heartbeat, Some(clock.now()));
        assert_eq!(beat.created_at, agent.created_at);
        assert_eq!(agents.get(agent.id).await.unwrap(), beat);
    }

    #[tokio::test]
    async fn test_duplicate_and_bad_names_rejected() {
        let agents = registry(ManualClock::at(0));
        agents.register("builder", None).await.unwrap();

        let dup = agents.register("builder", None).await.unwrap_err();
        assert!(matches!(dup, Error::InvalidInput(ref m) if m == "Agent name already exists"));

        assert!(matches!(
            agents.register("  ", None).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(matches!(
            agents.register("x".repeat(101), None).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(agents.register("x".repeat(100), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_agent_is_not_found() {
        let agents = registry(ManualClock::at(0));

        assert!(agents.get(7).await.unwrap_err().is_not_found());
        assert!(agents.heartbeat(7).await.unwrap_err().is_not_found());
        assert!(agents.remove(7).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_remove_then_list() {
        let agents = registry(ManualClock::at(0));
        let a = agents.register("a", None).await.unwrap();
        let b = agents.register("b", None).await.unwrap();

        agents.remove(a.id).await.unwrap();

        let listed = agents.list(0, 10).await.unwrap();
        assert_eq!(listed, vec![b]);
    }
}
