//! Simulated executor - echoes the command back without running anything

use super::r#trait::Executor;
use async_trait::async_trait;
use tasktrack_foundation::{Result, Task};

/// Default backend: the result is `"Executed: {command}"`
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedExecutor;

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn execute(&self, task: &Task) -> Result<String> {
        Ok(format!("Executed: {}", task.command))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
