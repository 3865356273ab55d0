//! Due-job scheduler.
//!
//! Each pass queries immediate jobs first, fills the remaining batch with
//! time-scheduled jobs whose due time has passed, claims each candidate
//! with a status CAS (PENDING -> QUEUED) and enqueues a dispatch message
//! for every claim won. Claim losses are normal skips; the pass reports
//! `{evaluated, dispatched}`.

pub mod config;
pub mod error;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{DispatchSink, Scheduler, SchedulerReport};
