//! Task state machine
//!
//! Pure transition logic: given a task snapshot, a target status and the
//! fields that accompany it, produce the next snapshot or refuse. Timestamps
//! are clamped so `created_at <= started_at <= completed_at` holds even if
//! the clock steps backwards.

use chrono::{DateTime, Utc};
use tasktrack_foundation::{Error, Result, Task, TaskStatus};

/// Data carried by a transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionFields {
    /// Output, only accepted when entering COMPLETED
    pub result: Option<String>,

    /// Failure detail, only accepted when entering FAILED
    pub error: Option<String>,
}

impl TransitionFields {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn result(output: impl Into<String>) -> Self {
        Self {
            result: Some(output.into()),
            error: None,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(detail.into()),
        }
    }
}

/// Apply `to` to `task`, returning the next snapshot
///
/// Illegal edges yield `Error::Conflict`; fields that do not belong to the
/// target status yield `Error::InvalidInput`. `task` itself is never touched.
pub fn apply_transition(
    task: &Task,
    to: TaskStatus,
    fields: TransitionFields,
    now: DateTime<Utc>,
) -> Result<Task> {
    if !task.status.can_transition_to(to) {
        return Err(Error::conflict(task.id, task.status, to));
    }

    if fields.result.is_some() && to != TaskStatus::Completed {
        return Err(Error::InvalidInput(format!(
            "result is only allowed when completing, not when moving to {}",
            to
        )));
    }
    if fields.error.is_some() && to != TaskStatus::Failed {
        return Err(Error::InvalidInput(format!(
            "error is only allowed when failing, not when moving to {}",
            to
        )));
    }

    let mut next = task.clone();
    next.status = to;

    // Legal targets are RUNNING or a terminal status
    if to.is_terminal() {
        let floor = task.started_at.unwrap_or(task.created_at);
        next.completed_at = Some(now.max(floor));
        next.result = fields.result;
        next.error = fields.error;
    } else {
        next.started_at = Some(now.max(task.created_at));
    }

    Ok(next)
}
