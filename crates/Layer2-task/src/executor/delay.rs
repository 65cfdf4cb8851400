//! Processing delay between start and execution

use async_trait::async_trait;
use std::time::Duration;

/// Awaitable pause; swapped out in tests so nothing sleeps
#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self);
}

/// Real timer
#[derive(Debug, Clone, Copy)]
pub struct SleepDelay {
    duration: Duration,
}

impl SleepDelay {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[async_trait]
impl Delay for SleepDelay {
    async fn wait(&self) {
        if !self.duration.is_zero() {
            tokio::time::sleep(self.duration).await;
        }
    }
}

/// Returns immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl Delay for NoDelay {
    async fn wait(&self) {}
}
