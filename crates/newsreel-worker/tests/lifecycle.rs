//! End-to-end lifecycle tests: ingest -> schedule -> dispatch -> pipeline,
//! over the in-memory store and fake step actions that mirror the real
//! workflow's status writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use newsreel_models::{
    attribute_keys, AttributePatch, ClipAsset, DispatchMessage, JobRecord, JobStatus, JobType,
    RunContext,
};
use newsreel_scheduler::{DispatchSink, Scheduler, SchedulerConfig, SchedulerResult};
use newsreel_store::{JobStore, MemoryJobStore};
use newsreel_worker::{
    PipelineDriver, PipelineOutcome, WorkerConfig, WorkerError, WorkerResult, WorkflowActions,
};

/// Sink capturing dispatch messages in memory.
#[derive(Default)]
struct CapturingSink {
    messages: Mutex<Vec<DispatchMessage>>,
}

#[async_trait]
impl DispatchSink for CapturingSink {
    async fn dispatch(&self, message: &DispatchMessage) -> SchedulerResult<()> {
        self.messages.lock().await.push(message.clone());
        Ok(())
    }
}

/// Step actions that perform the same status writes as the production
/// workflow, minus object storage and providers.
struct StoreBackedWorkflow {
    store: Arc<MemoryJobStore>,
    clip_ids: Vec<String>,
    fatal_clip: Option<String>,
    stitched: Mutex<bool>,
}

impl StoreBackedWorkflow {
    fn new(store: Arc<MemoryJobStore>, clip_count: usize) -> Self {
        Self {
            store,
            clip_ids: (1..=clip_count).map(|i| format!("clip-{:03}", i)).collect(),
            fatal_clip: None,
            stitched: Mutex::new(false),
        }
    }

    fn failing_at(store: Arc<MemoryJobStore>, clip_count: usize, clip_id: &str) -> Self {
        Self {
            fatal_clip: Some(clip_id.to_string()),
            ..Self::new(store, clip_count)
        }
    }
}

#[async_trait]
impl WorkflowActions for StoreBackedWorkflow {
    async fn generate_prompts(&self, message: &DispatchMessage) -> WorkerResult<RunContext> {
        let mut patch = AttributePatch::new();
        patch.insert(
            attribute_keys::BUNDLE_KEY.to_string(),
            Some(serde_json::json!(format!("jobs/{}/bundle.json", message.job_id))),
        );
        self.store
            .update_status(&message.job_id, JobStatus::Running, &patch)
            .await?;

        Ok(RunContext {
            job_id: message.job_id.clone(),
            article_url: message.url.clone(),
            bundle_key: format!("jobs/{}/bundle.json", message.job_id),
            output_prefix: format!("jobs/{}/run", message.job_id),
            clip_ids: self.clip_ids.clone(),
            dry_run: true,
            pipeline_config: None,
        })
    }

    async fn render_clip(&self, _context: &RunContext, clip_id: &str) -> WorkerResult<ClipAsset> {
        if self.fatal_clip.as_deref() == Some(clip_id) {
            return Err(WorkerError::job_failed(format!(
                "provider rejected {}",
                clip_id
            )));
        }
        Ok(ClipAsset {
            clip_id: clip_id.to_string(),
            path: format!("clips/{}.mp4", clip_id),
        })
    }

    async fn stitch_final(&self, context: &RunContext) -> WorkerResult<String> {
        *self.stitched.lock().await = true;
        let key = format!("jobs/final/{}-final.mp4", context.job_id);
        let mut patch = AttributePatch::new();
        patch.insert(
            attribute_keys::FINAL_VIDEO_KEY.to_string(),
            Some(serde_json::json!(key)),
        );
        self.store
            .update_status(&context.job_id, JobStatus::Completed, &patch)
            .await?;
        Ok(key)
    }

    async fn mark_failed(&self, job_id: &str, error: &WorkerError) -> WorkerResult<()> {
        let mut patch = AttributePatch::new();
        patch.insert(
            attribute_keys::ERROR_MESSAGE.to_string(),
            Some(serde_json::json!(error.failure_message())),
        );
        self.store
            .update_status(job_id, JobStatus::Failed, &patch)
            .await?;
        Ok(())
    }
}

fn ingest(store: &MemoryJobStore, url: &str, job_type: JobType) -> JobRecord {
    let job_id = newsreel_models::slugify(url);
    JobRecord::new(job_id, url, job_type, Utc::now(), BTreeMap::new())
}

async fn run_scheduler_pass(
    store: Arc<MemoryJobStore>,
) -> (Vec<DispatchMessage>, newsreel_scheduler::SchedulerReport) {
    let sink = Arc::new(CapturingSink::default());
    let scheduler = Scheduler::new(
        store,
        sink.clone(),
        SchedulerConfig {
            batch_size: 10,
            poll_interval: std::time::Duration::from_secs(1),
        },
    );
    let report = scheduler.run_pass().await.unwrap();
    let messages = sink.messages.lock().await.clone();
    (messages, report)
}

#[tokio::test]
async fn test_immediate_job_reaches_completed() {
    let store = Arc::new(MemoryJobStore::new());
    let record = ingest(&store, "https://example.com/story", JobType::Immediate);
    assert_eq!(record.job_id, "https-example-com-story");
    store.create(&record).await.unwrap();
    assert_eq!(
        store.get(&record.job_id).await.unwrap().unwrap().status,
        JobStatus::Pending
    );

    let (messages, report) = run_scheduler_pass(store.clone()).await;
    assert_eq!(report.dispatched, 1);
    assert_eq!(messages.len(), 1);
    assert_eq!(
        store.get(&record.job_id).await.unwrap().unwrap().status,
        JobStatus::Queued
    );

    let workflow = Arc::new(StoreBackedWorkflow::new(store.clone(), 3));
    let driver = PipelineDriver::new(workflow.clone(), WorkerConfig::default());
    let outcome = driver.run(&messages[0]).await.unwrap();

    let final_key = "jobs/final/https-example-com-story-final.mp4".to_string();
    assert_eq!(
        outcome,
        PipelineOutcome::Completed {
            final_video_key: final_key.clone()
        }
    );

    let finished = store.get(&record.job_id).await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.final_video_key(), Some(final_key.as_str()));
}

#[tokio::test]
async fn test_fatal_clip_failure_marks_job_failed() {
    let store = Arc::new(MemoryJobStore::new());
    let record = ingest(&store, "https://example.com/bad-story", JobType::Immediate);
    store.create(&record).await.unwrap();

    let (messages, _) = run_scheduler_pass(store.clone()).await;

    let workflow = Arc::new(StoreBackedWorkflow::failing_at(
        store.clone(),
        3,
        "clip-002",
    ));
    let driver = PipelineDriver::new(workflow.clone(), WorkerConfig::default());
    let outcome = driver.run(&messages[0]).await.unwrap();
    assert!(matches!(outcome, PipelineOutcome::Failed { .. }));

    let failed = store.get(&record.job_id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed
        .error_message()
        .is_some_and(|m| m.contains("clip-002")));

    // Stitch never ran
    assert!(!*workflow.stitched.lock().await);
}

#[tokio::test]
async fn test_second_scheduler_pass_dispatches_nothing() {
    let store = Arc::new(MemoryJobStore::new());
    store
        .create(&ingest(
            &store,
            "https://example.com/story",
            JobType::Immediate,
        ))
        .await
        .unwrap();

    let (_, first) = run_scheduler_pass(store.clone()).await;
    assert_eq!(first.dispatched, 1);

    let (messages, second) = run_scheduler_pass(store).await;
    assert_eq!(second.dispatched, 0);
    assert!(messages.is_empty());
}
