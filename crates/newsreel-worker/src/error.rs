//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Error messages persisted to the job record are truncated to this many
/// characters.
pub const ERROR_MESSAGE_MAX_LEN: usize = 400;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation error: {0}")]
    Validation(#[from] newsreel_models::ValidationError),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Article fetch failed: {0}")]
    ArticleFetchFailed(String),

    #[error("Execution timed out after {0} seconds")]
    ExecutionTimeout(u64),

    #[error("Store error: {0}")]
    Store(#[from] newsreel_store::StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] newsreel_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] newsreel_queue::QueueError),

    #[error("Provider error: {0}")]
    Provider(#[from] newsreel_providers::ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(newsreel_models::ValidationError::new(msg))
    }

    /// Whether a failed clip render deserves another in-process attempt.
    /// Only timeout-class provider failures qualify; fatal provider
    /// responses and validation errors never do.
    pub fn is_clip_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Whether message redelivery is likely to help. Validation errors
    /// and fatal provider responses are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::ConfigError(_) => false,
            Self::Provider(e) => e.is_timeout(),
            Self::JobFailed(_) => false,
            _ => true,
        }
    }

    /// The message persisted to the job record on MARK_FAILED, truncated.
    pub fn failure_message(&self) -> String {
        truncate_message(&self.to_string())
    }
}

/// Truncate a failure message to the persisted bound.
pub fn truncate_message(message: &str) -> String {
    message.chars().take(ERROR_MESSAGE_MAX_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsreel_providers::ProviderError;

    #[test]
    fn test_timeout_errors_are_clip_retryable() {
        let timeout = WorkerError::Provider(ProviderError::Timeout {
            provider: "sora",
            job_id: "x".to_string(),
            waited_secs: 600,
        });
        assert!(timeout.is_clip_retryable());

        let fatal = WorkerError::Provider(ProviderError::JobFailed {
            provider: "sora",
            job_id: "x".to_string(),
            message: "content policy".to_string(),
        });
        assert!(!fatal.is_clip_retryable());

        assert!(!WorkerError::validation("bad input").is_clip_retryable());
    }

    #[test]
    fn test_failure_message_truncation() {
        let long = "x".repeat(1000);
        let error = WorkerError::JobFailed(long);
        assert_eq!(error.failure_message().chars().count(), ERROR_MESSAGE_MAX_LEN);
    }
}
