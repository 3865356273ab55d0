//! Redis Streams dispatch queue.
//!
//! This crate provides:
//! - Dispatch message enqueueing via Redis Streams
//! - Worker consumption with a consumer group, retry counters and DLQ
//! - Reclaim of messages left pending by crashed workers

pub mod error;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::{DispatchQueue, QueueConfig};
