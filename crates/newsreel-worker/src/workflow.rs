//! Workflow actions: the four idempotent steps a dispatched job moves
//! through. Each action re-derives its working state from object storage
//! and the bundle, so re-executing a step after a crash converges on the
//! same result instead of compounding it.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use newsreel_models::{
    attribute_keys, AttributePatch, ClipAsset, DispatchMessage, JobStatus, PipelineConfig,
    RunContext,
};
use newsreel_storage::{keys, ArtifactSync, BundleStore, StorageClient};
use newsreel_store::JobStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::runner::RunnerCache;

/// The step actions the driver sequences. One production implementation
/// (`PipelineWorkflow`); fakes stand in for it in driver tests.
#[async_trait]
pub trait WorkflowActions: Send + Sync {
    async fn generate_prompts(&self, message: &DispatchMessage) -> WorkerResult<RunContext>;
    async fn render_clip(&self, context: &RunContext, clip_id: &str) -> WorkerResult<ClipAsset>;
    async fn stitch_final(&self, context: &RunContext) -> WorkerResult<String>;
    async fn mark_failed(&self, job_id: &str, error: &WorkerError) -> WorkerResult<()>;
}

pub struct PipelineWorkflow {
    store: Arc<dyn JobStore>,
    bundle_store: BundleStore,
    artifacts: ArtifactSync,
    bucket: String,
    runners: RunnerCache,
    config: WorkerConfig,
}

impl PipelineWorkflow {
    pub fn new(
        store: Arc<dyn JobStore>,
        storage: StorageClient,
        runners: RunnerCache,
        config: WorkerConfig,
    ) -> Self {
        let bucket = storage.bucket().to_string();
        Self {
            store,
            bundle_store: BundleStore::new(storage.clone()),
            artifacts: ArtifactSync::new(storage),
            bucket,
            runners,
            config,
        }
    }

    fn effective_config(&self, message: &DispatchMessage) -> PipelineConfig {
        message.pipeline_config().unwrap_or_default()
    }

    fn dry_run(&self, config: &PipelineConfig) -> bool {
        config
            .get("dry_run")
            .and_then(|v| v.as_bool())
            .unwrap_or(self.config.default_dry_run)
    }

    /// Reset the local run directory to exactly the stored run prefix.
    /// Stale local files from a previous attempt are discarded first.
    async fn refresh_run_dir(&self, context: &RunContext) -> WorkerResult<std::path::PathBuf> {
        let run_dir = self.config.run_dir(&context.job_id);
        if run_dir.exists() {
            tokio::fs::remove_dir_all(&run_dir).await?;
        }
        tokio::fs::create_dir_all(&run_dir).await?;
        self.artifacts
            .download_prefix(&context.output_prefix, &run_dir)
            .await?;
        Ok(run_dir)
    }
}

#[async_trait]
impl WorkflowActions for PipelineWorkflow {
    /// GENERATE_PROMPTS: build the bundle through the prompt stage, persist
    /// it, and move the job to RUNNING with its output locations recorded.
    async fn generate_prompts(&self, message: &DispatchMessage) -> WorkerResult<RunContext> {
        message.validate()?;
        let job_id = message.job_id.as_str();
        let logger = JobLogger::new(job_id, "generate_prompts");
        logger.start(&format!("Generating prompts for {}", message.url));

        let pipeline_config = self.effective_config(message);
        let dry_run = self.dry_run(&pipeline_config);
        let runner = self.runners.get(&pipeline_config).await?;

        let bundle = runner.run_prompts(&message.url, dry_run).await?;

        // The job id is the slug of the submitted URL; a bundle built for a
        // different article means the fetch was redirected somewhere else.
        if bundle.article.slug != job_id {
            return Err(WorkerError::validation(format!(
                "article slug {} does not match job id {}",
                bundle.article.slug, job_id
            )));
        }

        let run_dir = self.config.run_dir(job_id);
        tokio::fs::create_dir_all(&run_dir).await?;

        let bundle_key = self.bundle_store.save(job_id, &bundle).await?;
        let output_prefix = keys::run_prefix(job_id);
        self.artifacts.upload_directory(&run_dir, &output_prefix).await?;

        let mut patch = AttributePatch::new();
        patch.insert(
            attribute_keys::OUTPUT_BUCKET.to_string(),
            Some(json!(self.bucket)),
        );
        patch.insert(
            attribute_keys::OUTPUT_PREFIX.to_string(),
            Some(json!(output_prefix)),
        );
        patch.insert(
            attribute_keys::BUNDLE_KEY.to_string(),
            Some(json!(bundle_key)),
        );
        self.store
            .update_status(job_id, JobStatus::Running, &patch)
            .await?;

        let clip_ids = bundle.clip_ids();
        logger.complete(&format!("Planned {} clips", clip_ids.len()));

        Ok(RunContext {
            job_id: job_id.to_string(),
            article_url: message.url.clone(),
            bundle_key,
            output_prefix,
            clip_ids,
            dry_run,
            pipeline_config: if pipeline_config.is_empty() {
                None
            } else {
                Some(pipeline_config)
            },
        })
    }

    /// RENDER_CLIP: render one clip, skipping the provider call when a
    /// non-empty asset for it already exists from an earlier attempt.
    async fn render_clip(&self, context: &RunContext, clip_id: &str) -> WorkerResult<ClipAsset> {
        context.validate()?;
        let job_id = context.job_id.as_str();
        let logger = JobLogger::new(job_id, "render_clip");
        logger.start(&format!("Rendering {}", clip_id));

        let run_dir = self.refresh_run_dir(context).await?;
        let mut bundle = self.bundle_store.load_required(job_id).await?;

        if let Some(asset) = bundle.asset_for(clip_id) {
            let local = run_dir.join(&asset.path);
            if file_non_empty(&local).await {
                logger.progress(&format!("{} already rendered, skipping", clip_id));
                return Ok(asset.clone());
            }
        }

        let pipeline_config = context.pipeline_config.clone().unwrap_or_default();
        let runner = self.runners.get(&pipeline_config).await?;
        let asset = runner
            .render_clip(&mut bundle, clip_id, &run_dir, context.dry_run)
            .await?;

        self.bundle_store.save(job_id, &bundle).await?;
        self.artifacts
            .upload_directory(&run_dir, &context.output_prefix)
            .await?;

        logger.complete(&format!("Rendered {}", clip_id));
        Ok(asset)
    }

    /// STITCH_FINAL: assemble the final video, publish it, and move the job
    /// to COMPLETED with the final artifact key recorded.
    async fn stitch_final(&self, context: &RunContext) -> WorkerResult<String> {
        context.validate()?;
        let job_id = context.job_id.as_str();
        let logger = JobLogger::new(job_id, "stitch_final");
        logger.start("Stitching final video");

        let run_dir = self.refresh_run_dir(context).await?;
        let mut bundle = self.bundle_store.load_required(job_id).await?;

        let pipeline_config = context.pipeline_config.clone().unwrap_or_default();
        let runner = self.runners.get(&pipeline_config).await?;
        runner
            .stitch_final(&mut bundle, &run_dir, context.dry_run)
            .await?;

        self.bundle_store.save(job_id, &bundle).await?;
        self.artifacts
            .upload_directory(&run_dir, &context.output_prefix)
            .await?;

        let final_video = bundle.final_video.as_ref().map(|rel| run_dir.join(rel));
        let final_key = self
            .artifacts
            .export_final(job_id, &run_dir, final_video.as_deref())
            .await?
            .ok_or_else(|| WorkerError::job_failed("stitch produced no final video"))?;

        let mut patch = AttributePatch::new();
        patch.insert(
            attribute_keys::FINAL_VIDEO_KEY.to_string(),
            Some(json!(final_key)),
        );
        // A re-run after a prior failure clears the stale error
        patch.insert(attribute_keys::ERROR_MESSAGE.to_string(), None);
        self.store
            .update_status(job_id, JobStatus::Completed, &patch)
            .await?;

        logger.complete(&format!("Published {}", final_key));
        Ok(final_key)
    }

    /// MARK_FAILED: record the failure on the job. Works from the job id
    /// alone so it can run even when GENERATE_PROMPTS never produced a
    /// run context.
    async fn mark_failed(&self, job_id: &str, error: &WorkerError) -> WorkerResult<()> {
        let logger = JobLogger::new(job_id, "mark_failed");
        let message = error.failure_message();
        logger.failure(&message);

        let mut patch = AttributePatch::new();
        patch.insert(
            attribute_keys::ERROR_MESSAGE.to_string(),
            Some(json!(message)),
        );
        self.store
            .update_status(job_id, JobStatus::Failed, &patch)
            .await?;
        Ok(())
    }
}

async fn file_non_empty(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_non_empty() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.mp4");
        assert!(!file_non_empty(&missing).await);

        let empty = dir.path().join("empty.mp4");
        tokio::fs::write(&empty, b"").await.unwrap();
        assert!(!file_non_empty(&empty).await);

        let rendered = dir.path().join("clip-001.mp4");
        tokio::fs::write(&rendered, b"video bytes").await.unwrap();
        assert!(file_non_empty(&rendered).await);

        assert!(!file_non_empty(dir.path()).await);
    }
}
