//! Executor trait

use async_trait::async_trait;
use tasktrack_foundation::{Result, Task};

/// Executor trait - implement to add new execution backends
///
/// `Ok(output)` completes the task with `output` as its result; `Err` fails it
/// with the error's text. A panic inside `execute` is caught by the scheduler
/// and also fails the task.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute a task's command
    async fn execute(&self, task: &Task) -> Result<String>;

    /// Get executor name
    fn name(&self) -> &'static str;
}
