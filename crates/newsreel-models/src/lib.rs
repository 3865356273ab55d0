//! Shared data models for the Newsreel backend.
//!
//! This crate provides Serde-serializable types for:
//! - Job records, statuses, and attribute patches
//! - The dispatch message carried on the queue
//! - The per-execution run context
//! - The durable pipeline bundle snapshot

pub mod bundle;
pub mod context;
pub mod job;
pub mod slug;

// Re-export common types
pub use bundle::{
    ArticleInfo, Chunk, ChunkPlan, ClipAsset, ClipPrompt, PipelineBundle, ScriptBeat, ScriptPlan,
};
pub use context::{DispatchMessage, PipelineConfig, RunContext};
pub use job::{AttributePatch, JobRecord, JobStatus, JobType, ValidationError, attribute_keys};
pub use slug::slugify;
