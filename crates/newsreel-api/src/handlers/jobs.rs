//! Job ingest and lookup handlers.
//!
//! Ingest derives the job id from the article URL, so re-submitting the
//! same URL refreshes a still-PENDING job instead of creating a second
//! one. A job that has started is never replaced.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use newsreel_models::{slugify, JobRecord, JobStatus, JobType, PipelineConfig};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Job submission payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    /// Source article URL
    pub url: String,
    /// Scheduling mode, defaults to SCHEDULED
    #[serde(default)]
    pub job_type: Option<JobType>,
    /// Required for SCHEDULED jobs; defaults to now for IMMEDIATE
    #[serde(default)]
    pub scheduled_datetime: Option<DateTime<Utc>>,
    /// Free-form caller metadata
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
    /// Pipeline-config overrides, stored under `metadata.pipeline_config`
    #[serde(default)]
    pub pipeline_config: Option<PipelineConfig>,
}

/// Job representation returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: String,
    pub url: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub scheduled_datetime: DateTime<Utc>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl From<JobRecord> for JobResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            url: record.url,
            job_type: record.job_type,
            status: record.status,
            scheduled_datetime: record.scheduled_datetime,
            metadata: record.metadata,
            created_at: record.created_at,
            updated_at: record.updated_at,
            attributes: record.attributes,
        }
    }
}

/// POST /api/jobs
///
/// Create (or refresh) a job for an article URL.
///
/// Returns:
/// - 201: Job created
/// - 200: Existing PENDING job refreshed
/// - 400: Invalid payload
/// - 409: Job already started for this URL
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    let url = request.url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ApiError::bad_request("url must be an http(s) URL"));
    }

    let job_id = slugify(url);
    if job_id.is_empty() {
        return Err(ApiError::bad_request("url produces an empty job id"));
    }

    let job_type = request.job_type.unwrap_or_default();
    let scheduled_datetime = match (job_type, request.scheduled_datetime) {
        (JobType::Scheduled, Some(dt)) => dt,
        (JobType::Scheduled, None) => {
            return Err(ApiError::bad_request(
                "scheduledDatetime is required for SCHEDULED jobs",
            ))
        }
        (JobType::Immediate, dt) => dt.unwrap_or_else(Utc::now),
    };

    let mut metadata = request.metadata.unwrap_or_default();
    if let Some(config) = request.pipeline_config {
        metadata.insert(
            "pipeline_config".to_string(),
            serde_json::to_value(config).map_err(|e| ApiError::internal(e.to_string()))?,
        );
    }

    let record = JobRecord::new(&job_id, url, job_type, scheduled_datetime, metadata);

    match state.store.get(&job_id).await? {
        None => {
            state.store.create(&record).await.map_err(|e| {
                if matches!(e, newsreel_store::StoreError::AlreadyExists(_)) {
                    ApiError::conflict(format!("job {} already exists", job_id))
                } else {
                    ApiError::from(e)
                }
            })?;
            info!(job_id = %job_id, job_type = %job_type, "Job created");
            metrics::counter!("newsreel_jobs_ingested_total").increment(1);
            Ok((StatusCode::CREATED, Json(record.into())))
        }
        Some(existing) if existing.status == JobStatus::Pending => {
            // Unstarted job: overwrite schedule and metadata, keep identity
            let mut refreshed = record;
            refreshed.created_at = existing.created_at;
            state.store.replace(&refreshed).await?;
            info!(job_id = %job_id, "Pending job refreshed");
            Ok((StatusCode::OK, Json(refreshed.into())))
        }
        Some(existing) => Err(ApiError::conflict(format!(
            "job {} already {} for this URL",
            job_id, existing.status
        ))),
    }
}

/// Presigned download URL for a finished job's video.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUrlResponse {
    pub job_id: String,
    pub url: String,
    pub expires_in_seconds: u64,
}

const VIDEO_URL_TTL_SECS: u64 = 3600;

/// GET /api/jobs/:job_id/video
///
/// Short-lived download URL for a COMPLETED job's final video.
pub async fn get_job_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<VideoUrlResponse>> {
    let record = state
        .store
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {} not found", job_id)))?;

    if record.status != JobStatus::Completed {
        return Err(ApiError::conflict(format!(
            "job {} is {} and has no final video",
            job_id, record.status
        )));
    }

    let key = record
        .final_video_key()
        .ok_or_else(|| ApiError::internal(format!("job {} completed without a video key", job_id)))?;

    let url = state
        .storage
        .presign_get(key, std::time::Duration::from_secs(VIDEO_URL_TTL_SECS))
        .await?;

    Ok(Json(VideoUrlResponse {
        job_id,
        url,
        expires_in_seconds: VIDEO_URL_TTL_SECS,
    }))
}

/// GET /api/jobs/:job_id
///
/// Fetch a job by id.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let record = state
        .store
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {} not found", job_id)))?;
    Ok(Json(record.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use newsreel_queue::{DispatchQueue, QueueConfig};
    use newsreel_storage::{StorageClient, StorageConfig};
    use newsreel_store::{JobStore, MemoryJobStore};

    use crate::config::ApiConfig;

    async fn test_state() -> (AppState, Arc<MemoryJobStore>) {
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(DispatchQueue::new(QueueConfig::default()).unwrap());
        let storage = StorageClient::new(StorageConfig {
            endpoint_url: Some("http://localhost:9000".to_string()),
            access_key_id: "test".to_string(),
            secret_access_key: "test".to_string(),
            bucket_name: "test-bucket".to_string(),
            region: "auto".to_string(),
        })
        .await
        .unwrap();

        let state = AppState::new(
            ApiConfig::default(),
            store.clone(),
            queue,
            Arc::new(storage),
        );
        (state, store)
    }

    fn immediate_request(url: &str) -> CreateJobRequest {
        CreateJobRequest {
            url: url.to_string(),
            job_type: Some(JobType::Immediate),
            scheduled_datetime: None,
            metadata: None,
            pipeline_config: None,
        }
    }

    #[tokio::test]
    async fn test_create_immediate_job_derives_slug_id() {
        let (state, _) = test_state().await;

        let (status, Json(job)) = create_job(
            State(state),
            Json(immediate_request("https://example.com/story")),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(job.job_id, "https-example-com-story");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.job_type, JobType::Immediate);
    }

    #[tokio::test]
    async fn test_scheduled_job_requires_datetime() {
        let (state, _) = test_state().await;

        let request = CreateJobRequest {
            url: "https://example.com/story".to_string(),
            job_type: None, // defaults to SCHEDULED
            scheduled_datetime: None,
            metadata: None,
            pipeline_config: None,
        };

        let result = create_job(State(state), Json(request)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_non_http_url_is_rejected() {
        let (state, _) = test_state().await;
        let result = create_job(State(state), Json(immediate_request("ftp://example.com"))).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_resubmission_refreshes_pending_job() {
        let (state, store) = test_state().await;

        let (status, _) = create_job(
            State(state.clone()),
            Json(immediate_request("https://example.com/story")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let mut request = immediate_request("https://example.com/story");
        request.metadata = Some(BTreeMap::from([(
            "note".to_string(),
            serde_json::json!("resubmitted"),
        )]));

        let (status, Json(job)) = create_job(State(state), Json(request)).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job.metadata.get("note"), Some(&serde_json::json!("resubmitted")));

        let stored = store.all().await;
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_resubmission_of_started_job_conflicts() {
        let (state, store) = test_state().await;

        create_job(
            State(state.clone()),
            Json(immediate_request("https://example.com/story")),
        )
        .await
        .unwrap();

        store
            .transition_status("https-example-com-story", JobStatus::Pending, JobStatus::Queued)
            .await
            .unwrap();

        let result = create_job(
            State(state),
            Json(immediate_request("https://example.com/story")),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_pipeline_config_lands_in_metadata() {
        let (state, _) = test_state().await;

        let mut request = immediate_request("https://example.com/story");
        let mut config = PipelineConfig::new();
        config.insert("media_provider".to_string(), serde_json::json!("veo"));
        request.pipeline_config = Some(config);

        let (_, Json(job)) = create_job(State(state), Json(request)).await.unwrap();
        assert_eq!(
            job.metadata.get("pipeline_config"),
            Some(&serde_json::json!({"media_provider": "veo"}))
        );
    }

    #[tokio::test]
    async fn test_video_url_requires_completed_job() {
        let (state, _) = test_state().await;

        create_job(
            State(state.clone()),
            Json(immediate_request("https://example.com/story")),
        )
        .await
        .unwrap();

        let result = get_job_video(
            State(state),
            Path("https-example-com-story".to_string()),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_get_missing_job_is_not_found() {
        let (state, _) = test_state().await;
        let result = get_job(State(state), Path("ghost".to_string())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
