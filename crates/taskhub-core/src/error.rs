//! Error type shared by every TaskHub crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskHubError {
    /// Bad input from the caller (progress range, recurrence range, tenant scope).
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TaskHubError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Errors that are reported back to the caller as client errors.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, TaskHubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        assert!(TaskHubError::validation("progress must be 0-100").is_client_error());
        assert!(TaskHubError::not_found("task t1").is_client_error());
        assert!(!TaskHubError::Store("disk full".into()).is_client_error());
    }

    #[test]
    fn test_display() {
        let err = TaskHubError::not_found("task t1");
        assert_eq!(err.to_string(), "Not found: task t1");
    }
}
