//! Pipeline driver: sequences GENERATE_PROMPTS, the per-clip renders, and
//! STITCH_FINAL for one dispatched job, and turns any step failure into a
//! MARK_FAILED write.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::time::{sleep, timeout};
use uuid::Uuid;

use newsreel_models::{DispatchMessage, RunContext};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::workflow::WorkflowActions;

const EXECUTION_NAME_MAX_LEN: usize = 80;

/// How a driven job ended. Both variants are terminal from the queue's
/// point of view: the message is acked either way, because the failure has
/// already been recorded on the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed { final_video_key: String },
    Failed { message: String },
}

pub struct PipelineDriver {
    workflow: Arc<dyn WorkflowActions>,
    config: WorkerConfig,
}

impl PipelineDriver {
    pub fn new(workflow: Arc<dyn WorkflowActions>, config: WorkerConfig) -> Self {
        Self { workflow, config }
    }

    /// Run the full pipeline for one dispatch message.
    ///
    /// Pipeline failures are recorded via MARK_FAILED and returned as
    /// `Ok(Failed)`. An `Err` means the failure could not even be recorded
    /// and the message should be redelivered.
    pub async fn run(&self, message: &DispatchMessage) -> WorkerResult<PipelineOutcome> {
        let execution = execution_name(&message.job_id);
        let logger = JobLogger::new(&message.job_id, "pipeline");
        logger.start(&format!("Execution {}", execution));
        let started = Instant::now();

        let result = timeout(self.config.job_timeout, self.run_steps(message)).await;
        let result = match result {
            Ok(inner) => inner,
            Err(_) => Err(WorkerError::ExecutionTimeout(
                self.config.job_timeout.as_secs(),
            )),
        };

        metrics::histogram!("newsreel_job_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(final_video_key) => {
                metrics::counter!("newsreel_jobs_completed_total").increment(1);
                logger.complete(&format!("Final video at {}", final_video_key));
                Ok(PipelineOutcome::Completed { final_video_key })
            }
            Err(error) => {
                metrics::counter!("newsreel_jobs_failed_total").increment(1);
                self.workflow.mark_failed(&message.job_id, &error).await?;
                Ok(PipelineOutcome::Failed {
                    message: error.failure_message(),
                })
            }
        }
    }

    async fn run_steps(&self, message: &DispatchMessage) -> WorkerResult<String> {
        let context = self.workflow.generate_prompts(message).await?;
        for clip_id in &context.clip_ids {
            self.render_with_retry(&context, clip_id).await?;
        }
        self.workflow.stitch_final(&context).await
    }

    /// Render one clip, retrying timeout-class failures with exponential
    /// backoff. Fatal failures surface immediately.
    async fn render_with_retry(&self, context: &RunContext, clip_id: &str) -> WorkerResult<()> {
        let attempts = self.config.clip_retry_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            match self.workflow.render_clip(context, clip_id).await {
                Ok(_) => return Ok(()),
                Err(error) if error.is_clip_retryable() && attempt + 1 < attempts => {
                    let delay = self.config.clip_retry_base * 2u32.pow(attempt);
                    JobLogger::new(&context.job_id, "render_clip").warning(&format!(
                        "{} attempt {} failed ({}), retrying in {:?}",
                        clip_id,
                        attempt + 1,
                        error,
                        delay
                    ));
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Unique, human-scannable execution name: short random prefix, epoch
/// seconds, then the job id, truncated to the name length bound.
fn execution_name(job_id: &str) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let name = format!("{}-{}-{}", &nonce[..8], epoch, job_id);
    name.chars().take(EXECUTION_NAME_MAX_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use newsreel_models::{ClipAsset, JobType};
    use newsreel_providers::ProviderError;

    use crate::workflow::WorkflowActions;

    #[derive(Default)]
    struct FakeWorkflow {
        calls: Mutex<Vec<String>>,
        clip_ids: Vec<String>,
        fail_prompts: bool,
        render_timeouts_before_success: Mutex<u32>,
        fatal_render: bool,
    }

    impl FakeWorkflow {
        fn with_clips(ids: &[&str]) -> Self {
            Self {
                clip_ids: ids.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkflowActions for FakeWorkflow {
        async fn generate_prompts(&self, message: &DispatchMessage) -> WorkerResult<RunContext> {
            self.record("generate_prompts");
            if self.fail_prompts {
                return Err(WorkerError::job_failed("prompt stage exploded"));
            }
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

        async fn render_clip(
            &self,
            context: &RunContext,
            clip_id: &str,
        ) -> WorkerResult<ClipAsset> {
            self.record(format!("render:{}", clip_id));
            if self.fatal_render {
                return Err(WorkerError::Provider(ProviderError::JobFailed {
                    provider: "sora",
                    job_id: context.job_id.clone(),
                    message: "content policy".into(),
                }));
            }
            let mut remaining = self.render_timeouts_before_success.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(WorkerError::Provider(ProviderError::Timeout {
                    provider: "sora",
                    job_id: context.job_id.clone(),
                    waited_secs: 600,
                }));
            }
            Ok(ClipAsset {
                clip_id: clip_id.to_string(),
                path: format!("clips/{}.mp4", clip_id),
            })
        }

        async fn stitch_final(&self, context: &RunContext) -> WorkerResult<String> {
            self.record("stitch_final");
            Ok(format!("jobs/final/{}-final.mp4", context.job_id))
        }

        async fn mark_failed(&self, _job_id: &str, error: &WorkerError) -> WorkerResult<()> {
            self.record(format!("mark_failed:{}", error.failure_message()));
            Ok(())
        }
    }

    fn message(job_id: &str) -> DispatchMessage {
        DispatchMessage {
            job_id: job_id.to_string(),
            url: format!("https://example.com/{}", job_id),
            scheduled_datetime: Utc::now(),
            metadata: BTreeMap::new(),
            job_type: JobType::Scheduled,
        }
    }

    fn config() -> WorkerConfig {
        let mut config = WorkerConfig::default();
        config.clip_retry_attempts = 3;
        config.clip_retry_base = std::time::Duration::from_millis(1);
        config
    }

    #[tokio::test]
    async fn test_happy_path_runs_all_steps_in_order() {
        let workflow = Arc::new(FakeWorkflow::with_clips(&["clip-001", "clip-002"]));
        let driver = PipelineDriver::new(workflow.clone(), config());

        let outcome = driver.run(&message("job-a")).await.unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::Completed {
                final_video_key: "jobs/final/job-a-final.mp4".to_string()
            }
        );
        assert_eq!(
            workflow.calls(),
            vec![
                "generate_prompts",
                "render:clip-001",
                "render:clip-002",
                "stitch_final"
            ]
        );
    }

    #[tokio::test]
    async fn test_prompt_failure_marks_job_failed_and_acks() {
        let workflow = Arc::new(FakeWorkflow {
            fail_prompts: true,
            ..FakeWorkflow::with_clips(&["clip-001"])
        });
        let driver = PipelineDriver::new(workflow.clone(), config());

        let outcome = driver.run(&message("job-b")).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Failed { .. }));

        let calls = workflow.calls();
        assert_eq!(calls[0], "generate_prompts");
        assert!(calls[1].starts_with("mark_failed:"));
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_render_is_retried_then_succeeds() {
        let workflow = Arc::new(FakeWorkflow {
            render_timeouts_before_success: Mutex::new(2),
            ..FakeWorkflow::with_clips(&["clip-001"])
        });
        let driver = PipelineDriver::new(workflow.clone(), config());

        let outcome = driver.run(&message("job-c")).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Completed { .. }));

        let renders = workflow
            .calls()
            .iter()
            .filter(|c| c.starts_with("render:"))
            .count();
        assert_eq!(renders, 3);
    }

    #[tokio::test]
    async fn test_fatal_render_fails_without_retry() {
        let workflow = Arc::new(FakeWorkflow {
            fatal_render: true,
            ..FakeWorkflow::with_clips(&["clip-001"])
        });
        let driver = PipelineDriver::new(workflow.clone(), config());

        let outcome = driver.run(&message("job-d")).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Failed { .. }));

        let calls = workflow.calls();
        let renders = calls.iter().filter(|c| c.starts_with("render:")).count();
        assert_eq!(renders, 1);
        assert!(calls.iter().any(|c| c.starts_with("mark_failed:")));
        // stitch never ran
        assert!(!calls.iter().any(|c| c == "stitch_final"));
    }

    #[test]
    fn test_execution_name_is_bounded_and_carries_job_id() {
        let name = execution_name("my-article-slug");
        assert!(name.len() <= EXECUTION_NAME_MAX_LEN);
        assert!(name.contains("my-article-slug"));

        let long = "x".repeat(200);
        assert_eq!(execution_name(&long).len(), EXECUTION_NAME_MAX_LEN);
    }
}
