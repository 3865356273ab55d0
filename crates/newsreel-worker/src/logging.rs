//! Structured job logging.

use tracing::{error, info, warn};

/// Logger carrying the job id and pipeline stage on every line.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    stage: String,
}

impl JobLogger {
    pub fn new(job_id: &str, stage: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage: stage.to_string(),
        }
    }

    /// Same job, different pipeline stage.
    pub fn stage(&self, stage: &str) -> Self {
        Self::new(&self.job_id, stage)
    }

    pub fn start(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "Started: {}", message);
    }

    pub fn progress(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "{}", message);
    }

    pub fn warning(&self, message: &str) {
        warn!(job_id = %self.job_id, stage = %self.stage, "{}", message);
    }

    pub fn complete(&self, message: &str) {
        info!(job_id = %self.job_id, stage = %self.stage, "Completed: {}", message);
    }

    pub fn failure(&self, message: &str) {
        error!(job_id = %self.job_id, stage = %self.stage, "Failed: {}", message);
    }
}
