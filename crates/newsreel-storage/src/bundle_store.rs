//! Durable pipeline bundle storage.
//!
//! The bundle at `jobs/{job_id}/bundle.json` is the resumability record:
//! each pipeline step reloads it, merges its own results in and saves it
//! back, so a re-dispatched job skips work that already completed.

use tracing::{debug, info};

use newsreel_models::PipelineBundle;

use crate::client::StorageClient;
use crate::error::{StorageError, StorageResult};
use crate::keys;

/// Read/write access to job bundles.
#[derive(Clone)]
pub struct BundleStore {
    client: StorageClient,
}

impl BundleStore {
    pub fn new(client: StorageClient) -> Self {
        Self { client }
    }

    /// Load a job's bundle. Absence is `Ok(None)`.
    pub async fn load(&self, job_id: &str) -> StorageResult<Option<PipelineBundle>> {
        let key = keys::bundle_key(job_id);
        match self.client.download_bytes(&key).await {
            Ok(bytes) => {
                let bundle = serde_json::from_slice(&bytes)?;
                debug!("Loaded bundle for job {}", job_id);
                Ok(Some(bundle))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Save a job's bundle, replacing any previous version.
    pub async fn save(&self, job_id: &str, bundle: &PipelineBundle) -> StorageResult<String> {
        let key = keys::bundle_key(job_id);
        let bytes = serde_json::to_vec_pretty(bundle)?;
        self.client
            .upload_bytes(bytes, &key, "application/json")
            .await?;
        info!("Saved bundle for job {}", job_id);
        Ok(key)
    }

    /// Load a bundle that must exist.
    pub async fn load_required(&self, job_id: &str) -> StorageResult<PipelineBundle> {
        self.load(job_id)
            .await?
            .ok_or_else(|| StorageError::not_found(keys::bundle_key(job_id)))
    }
}
