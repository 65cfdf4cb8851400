//! Error types for tasktrack
//!
//! All fallible operations in the workspace return this error. Execution
//! faults and delivery failures are normally contained where they occur and
//! turned into data (a FAILED task, a dropped observer); only storage and
//! caller mistakes surface through `Result`.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// tasktrack error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Storage
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // Task lifecycle
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: task {task_id} cannot move from {from} to {to}")]
    Conflict {
        task_id: String,
        from: String,
        to: String,
    },

    #[error("Execution fault: {0}")]
    ExecutionFault(String),

    // ========================================================================
    // Live delivery
    // ========================================================================
    #[error("Delivery failure: {0}")]
    Delivery(String),

    // ========================================================================
    // General
    // ========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // Conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors a caller caused and can act on, as opposed to infrastructure faults
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Conflict { .. } | Error::InvalidInput(_)
        )
    }

    /// Storage-layer failures, propagated unmodified and never retried here
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Sqlite(_) | Error::Io(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Conflict error helper
    pub fn conflict(
        task_id: impl ToString,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Error::Conflict {
            task_id: task_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message() {
        let err = Error::conflict("abc", "completed", "running");
        assert_eq!(
            err.to_string(),
            "Conflict: task abc cannot move from completed to running"
        );
        assert!(err.is_conflict());
        assert!(err.is_user_facing());
    }

    #[test]
    fn test_storage_is_not_user_facing() {
        let err = Error::Storage("disk full".to_string());
        assert!(err.is_storage());
        assert!(!err.is_user_facing());
    }
}
