//! Tagged result of one execution

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why an execution did not produce a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Executor returned an error
    Error,
    /// Executor panicked
    Panic,
    /// Executor exceeded the execution timeout
    Timeout,
}

/// A failed execution, stored as the task's `error`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutionFault {
    pub kind: FaultKind,
    pub message: String,
}

impl ExecutionFault {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Error,
            message: message.into(),
        }
    }

    /// Build from a `catch_unwind` payload
    pub fn panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self {
            kind: FaultKind::Panic,
            message: format!("executor panicked: {}", detail),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self {
            kind: FaultKind::Timeout,
            message: format!("timed out after {}ms", after.as_millis()),
        }
    }
}

/// Success output or fault
pub type Outcome = std::result::Result<String, ExecutionFault>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payloads() {
        let fault = ExecutionFault::panic(Box::new("boom"));
        assert_eq!(fault.kind, FaultKind::Panic);
        assert_eq!(fault.to_string(), "executor panicked: boom");

        let fault = ExecutionFault::panic(Box::new(String::from("owned")));
        assert!(fault.message.ends_with("owned"));

        let fault = ExecutionFault::panic(Box::new(42u8));
        assert!(fault.message.contains("unknown"));
    }

    #[test]
    fn test_timeout_message() {
        let fault = ExecutionFault::timeout(Duration::from_millis(1500));
        assert_eq!(fault.to_string(), "timed out after 1500ms");
    }
}
