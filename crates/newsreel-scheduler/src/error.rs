//! Scheduler error types.

use thiserror::Error;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Store error: {0}")]
    Store(#[from] newsreel_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] newsreel_queue::QueueError),

    #[error("Dispatch failed for job {job_id}: {message}")]
    DispatchFailed { job_id: String, message: String },
}
