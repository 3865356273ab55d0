//! Application state.

use std::sync::Arc;

use newsreel_queue::DispatchQueue;
use newsreel_storage::StorageClient;
use newsreel_store::{FirestoreJobStore, JobStore};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<DispatchQueue>,
    pub storage: Arc<StorageClient>,
}

impl AppState {
    /// Assemble state from pre-built components (used by tests).
    pub fn new(
        config: ApiConfig,
        store: Arc<dyn JobStore>,
        queue: Arc<DispatchQueue>,
        storage: Arc<StorageClient>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            storage,
        }
    }

    /// Build production state from the environment.
    pub async fn from_env(config: ApiConfig) -> ApiResult<Self> {
        let store = FirestoreJobStore::from_env()
            .await
            .map_err(|e| ApiError::internal(format!("job store init failed: {}", e)))?;
        let queue = DispatchQueue::from_env()?;
        let storage = StorageClient::from_env()
            .await
            .map_err(|e| ApiError::internal(format!("storage init failed: {}", e)))?;

        Ok(Self {
            config,
            store: Arc::new(store),
            queue: Arc::new(queue),
            storage: Arc::new(storage),
        })
    }
}
