//! Pipeline worker.
//!
//! Consumes dispatch messages, drives the per-job pipeline state machine
//! (prompts -> per-clip renders -> stitch) and records the outcome in the
//! job store. Every step is idempotent against the durable bundle, so a
//! re-delivered message resumes instead of redoing finished work.

pub mod article;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod runner;
pub mod workflow;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use pipeline::{PipelineDriver, PipelineOutcome};
pub use runner::{MediaPipelineRunner, PipelineRunner, RunnerCache};
pub use workflow::{PipelineWorkflow, WorkflowActions};
