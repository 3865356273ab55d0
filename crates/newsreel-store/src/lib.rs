//! Durable job store.
//!
//! This crate provides:
//! - The [`JobStore`] contract the scheduler and worker depend on
//! - A Firestore REST implementation with precondition-based CAS
//! - An in-memory implementation for tests and local runs
//! - Retry with exponential backoff and jitter

pub mod client;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryJobStore;
pub use retry::{with_retry, RetryConfig};
pub use store::{FirestoreJobStore, JobStore};
