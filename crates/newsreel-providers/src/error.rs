//! Provider error types.
//!
//! Render failures are values, not panics: the pipeline driver inspects
//! `is_timeout()` to decide whether a clip render gets another attempt,
//! everything else fails the job.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    ConfigError(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API returned {status}: {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} job {job_id} failed: {message}")]
    JobFailed {
        provider: &'static str,
        job_id: String,
        message: String,
    },

    #[error("{provider} job {job_id} timed out after {waited_secs} seconds")]
    Timeout {
        provider: &'static str,
        job_id: String,
        waited_secs: u64,
    },

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    #[error("Stitch failed: {0}")]
    StitchFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_response(provider: &'static str, msg: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider,
            message: msg.into(),
        }
    }

    /// Timeout-class failures get bounded re-attempts from the pipeline
    /// driver; all other provider errors fail the clip outright.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
