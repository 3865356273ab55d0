//! Object storage for bundles and rendered artifacts.
//!
//! This crate provides:
//! - An S3-compatible storage client (upload/download/list/presign)
//! - The bundle store (`jobs/{job_id}/bundle.json`)
//! - Run-directory sync for idempotent step re-execution
//! - Key layout helpers for final exports

pub mod artifacts;
pub mod bundle_store;
pub mod client;
pub mod error;
pub mod keys;

pub use artifacts::ArtifactSync;
pub use bundle_store::BundleStore;
pub use client::{ObjectInfo, StorageClient, StorageConfig};
pub use error::{StorageError, StorageResult};
