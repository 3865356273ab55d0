//! Scheduling pass.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use newsreel_models::{DispatchMessage, JobRecord, JobStatus};
use newsreel_queue::DispatchQueue;
use newsreel_store::JobStore;

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};

/// Where claimed jobs go. Abstracted so passes can be tested without
/// Redis.
#[async_trait]
pub trait DispatchSink: Send + Sync {
    async fn dispatch(&self, message: &DispatchMessage) -> SchedulerResult<()>;
}

#[async_trait]
impl DispatchSink for DispatchQueue {
    async fn dispatch(&self, message: &DispatchMessage) -> SchedulerResult<()> {
        self.enqueue(message).await?;
        Ok(())
    }
}

/// Outcome of one scheduling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerReport {
    /// Candidates considered this pass
    pub evaluated: u32,
    /// Claims won and enqueued
    pub dispatched: u32,
}

/// The scheduler.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    sink: Arc<dyn DispatchSink>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        sink: Arc<dyn DispatchSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    /// Run one scheduling pass.
    ///
    /// Immediate jobs are queried first and take the batch capacity they
    /// need; scheduled-due jobs fill the remainder. The merged candidate
    /// list is de-duplicated by job id with immediate entries kept.
    pub async fn run_pass(&self) -> SchedulerResult<SchedulerReport> {
        let now = Utc::now();

        let immediate = self.store.query_immediate(self.config.batch_size).await?;
        let remaining = self.config.batch_size - immediate.len() as i32;
        let scheduled = if remaining > 0 {
            self.store.query_due_before(now, remaining).await?
        } else {
            Vec::new()
        };

        let candidates = merge_candidates(immediate, scheduled);

        let mut evaluated = 0u32;
        let mut dispatched = 0u32;

        for job in &candidates {
            evaluated += 1;

            let claimed = self
                .store
                .transition_status(&job.job_id, JobStatus::Pending, JobStatus::Queued)
                .await?;
            if !claimed {
                // Another scheduler got there first
                continue;
            }

            let message = DispatchMessage::from_record(job);
            if let Err(e) = self.sink.dispatch(&message).await {
                // The job is QUEUED but nothing is carrying it; surface
                // loudly and abort the pass so the failure is visible to
                // the invoker.
                warn!(job_id = %job.job_id, "dispatch failed after claim: {}", e);
                return Err(SchedulerError::DispatchFailed {
                    job_id: job.job_id.clone(),
                    message: e.to_string(),
                });
            }

            dispatched += 1;
            metrics::counter!("newsreel_scheduler_dispatched_total").increment(1);
            info!(job_id = %job.job_id, "Job dispatched");
        }

        let report = SchedulerReport {
            evaluated,
            dispatched,
        };
        info!(
            evaluated = report.evaluated,
            dispatched = report.dispatched,
            "Scheduling pass complete"
        );
        Ok(report)
    }
}

/// Immediate-first merge with de-duplication by job id.
fn merge_candidates(immediate: Vec<JobRecord>, scheduled: Vec<JobRecord>) -> Vec<JobRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(immediate.len() + scheduled.len());

    for job in immediate.into_iter().chain(scheduled) {
        if seen.insert(job.job_id.clone()) {
            merged.push(job);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use newsreel_models::JobType;
    use newsreel_store::MemoryJobStore;
    use tokio::sync::Mutex;

    struct RecordingSink {
        dispatched: Mutex<Vec<DispatchMessage>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                dispatched: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                dispatched: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl DispatchSink for RecordingSink {
        async fn dispatch(&self, message: &DispatchMessage) -> SchedulerResult<()> {
            if self.fail {
                return Err(SchedulerError::DispatchFailed {
                    job_id: message.job_id.clone(),
                    message: "sink unavailable".to_string(),
                });
            }
            self.dispatched.lock().await.push(message.clone());
            Ok(())
        }
    }

    fn job(id: &str, job_type: JobType, offset_hours: i64) -> JobRecord {
        JobRecord::new(
            id,
            format!("https://example.com/{}", id),
            job_type,
            Utc::now() + Duration::hours(offset_hours),
            Default::default(),
        )
    }

    fn scheduler(store: MemoryJobStore, sink: RecordingSink, batch: i32) -> (Scheduler, Arc<RecordingSink>) {
        let sink = Arc::new(sink);
        let scheduler = Scheduler::new(
            Arc::new(store),
            sink.clone(),
            SchedulerConfig {
                batch_size: batch,
                poll_interval: std::time::Duration::from_secs(1),
            },
        );
        (scheduler, sink)
    }

    #[tokio::test]
    async fn test_empty_store_reports_zero() {
        let (scheduler, _) = scheduler(MemoryJobStore::new(), RecordingSink::new(), 10);
        let report = scheduler.run_pass().await.unwrap();
        assert_eq!(
            report,
            SchedulerReport {
                evaluated: 0,
                dispatched: 0
            }
        );
    }

    #[tokio::test]
    async fn test_due_jobs_are_claimed_and_dispatched() {
        let store = MemoryJobStore::new();
        store.create(&job("due", JobType::Scheduled, -1)).await.unwrap();
        store
            .create(&job("future", JobType::Scheduled, 1))
            .await
            .unwrap();

        let (scheduler, sink) = scheduler(store.clone(), RecordingSink::new(), 10);
        let report = scheduler.run_pass().await.unwrap();

        assert_eq!(report.evaluated, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(sink.dispatched.lock().await[0].job_id, "due");
        assert_eq!(
            store.get("due").await.unwrap().unwrap().status,
            JobStatus::Queued
        );
        assert_eq!(
            store.get("future").await.unwrap().unwrap().status,
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_immediate_jobs_take_priority() {
        let store = MemoryJobStore::new();
        store
            .create(&job("urgent", JobType::Immediate, 12))
            .await
            .unwrap();
        store.create(&job("due-1", JobType::Scheduled, -2)).await.unwrap();
        store.create(&job("due-2", JobType::Scheduled, -1)).await.unwrap();

        let (scheduler, sink) = scheduler(store, RecordingSink::new(), 10);
        let report = scheduler.run_pass().await.unwrap();

        assert_eq!(report.evaluated, 3);
        assert_eq!(report.dispatched, 3);
        // Immediate dispatched first even though its schedule time is in
        // the future
        assert_eq!(sink.dispatched.lock().await[0].job_id, "urgent");
    }

    #[tokio::test]
    async fn test_scheduled_jobs_fill_remaining_capacity() {
        let store = MemoryJobStore::new();
        store
            .create(&job("urgent", JobType::Immediate, 12))
            .await
            .unwrap();
        store.create(&job("due-1", JobType::Scheduled, -2)).await.unwrap();
        store.create(&job("due-2", JobType::Scheduled, -1)).await.unwrap();

        // Batch of 2: the immediate job takes one slot, leaving room for
        // exactly one scheduled job.
        let (scheduler, sink) = scheduler(store, RecordingSink::new(), 2);
        let report = scheduler.run_pass().await.unwrap();

        assert_eq!(report.evaluated, 2);
        assert_eq!(report.dispatched, 2);
        assert_eq!(sink.dispatched.lock().await[0].job_id, "urgent");
    }

    #[tokio::test]
    async fn test_second_pass_finds_nothing_to_claim() {
        let store = MemoryJobStore::new();
        store.create(&job("due", JobType::Scheduled, -1)).await.unwrap();

        let (scheduler, _) = scheduler(store.clone(), RecordingSink::new(), 10);
        let first = scheduler.run_pass().await.unwrap();
        assert_eq!(first.dispatched, 1);

        let second = scheduler.run_pass().await.unwrap();
        assert_eq!(second.evaluated, 0);
        assert_eq!(second.dispatched, 0);
    }

    #[tokio::test]
    async fn test_merge_prefers_immediate_copy() {
        let immediate = vec![job("same", JobType::Immediate, 0)];
        let scheduled = vec![job("same", JobType::Scheduled, -1), job("other", JobType::Scheduled, -1)];
        let merged = merge_candidates(immediate, scheduled);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].job_id, "same");
        assert_eq!(merged[0].job_type, JobType::Immediate);
    }

    #[tokio::test]
    async fn test_dispatch_failure_aborts_pass() {
        let store = MemoryJobStore::new();
        store.create(&job("due", JobType::Scheduled, -1)).await.unwrap();

        let (scheduler, _) = scheduler(store.clone(), RecordingSink::failing(), 10);
        let result = scheduler.run_pass().await;
        assert!(matches!(
            result,
            Err(SchedulerError::DispatchFailed { .. })
        ));
        // The claim landed before the sink failed
        assert_eq!(
            store.get("due").await.unwrap().unwrap().status,
            JobStatus::Queued
        );
    }
}
