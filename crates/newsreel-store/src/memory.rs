//! In-memory job store for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use newsreel_models::{AttributePatch, JobRecord, JobStatus, JobType};

use crate::error::{StoreError, StoreResult};
use crate::store::JobStore;

/// Job store backed by a mutex-guarded map. CAS semantics hold because
/// every read-check-write happens under the lock.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, for assertions.
    pub async fn all(&self) -> Vec<JobRecord> {
        self.jobs.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, record: &JobRecord) -> StoreResult<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&record.job_id) {
            return Err(StoreError::AlreadyExists(record.job_id.clone()));
        }
        jobs.insert(record.job_id.clone(), record.clone());
        Ok(())
    }

    async fn replace(&self, record: &JobRecord) -> StoreResult<()> {
        self.jobs
            .lock()
            .await
            .insert(record.job_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> StoreResult<Option<JobRecord>> {
        Ok(self.jobs.lock().await.get(job_id).cloned())
    }

    async fn transition_status(
        &self,
        job_id: &str,
        expected: JobStatus,
        new: JobStatus,
    ) -> StoreResult<bool> {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(job_id) {
            Some(record) if record.status == expected => {
                record.status = new;
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        patch: &AttributePatch,
    ) -> StoreResult<()> {
        let mut jobs = self.jobs.lock().await;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::not_found(job_id))?;
        record.apply_patch(status, patch);
        Ok(())
    }

    async fn query_due_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i32,
    ) -> StoreResult<Vec<JobRecord>> {
        let jobs = self.jobs.lock().await;
        let mut due: Vec<JobRecord> = jobs
            .values()
            .filter(|r| {
                r.status == JobStatus::Pending
                    && r.job_type == JobType::Scheduled
                    && r.scheduled_datetime <= cutoff
            })
            .cloned()
            .collect();
        due.sort_by_key(|r| r.scheduled_datetime);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn query_immediate(&self, limit: i32) -> StoreResult<Vec<JobRecord>> {
        let jobs = self.jobs.lock().await;
        let mut immediate: Vec<JobRecord> = jobs
            .values()
            .filter(|r| r.status == JobStatus::Pending && r.job_type == JobType::Immediate)
            .cloned()
            .collect();
        immediate.sort_by_key(|r| r.scheduled_datetime);
        immediate.truncate(limit.max(0) as usize);
        Ok(immediate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: &str, job_type: JobType, scheduled: DateTime<Utc>) -> JobRecord {
        JobRecord::new(
            id,
            format!("https://example.com/{}", id),
            job_type,
            scheduled,
            Default::default(),
        )
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let store = MemoryJobStore::new();
        let r = record("a", JobType::Scheduled, Utc::now());
        store.create(&r).await.unwrap();
        assert!(matches!(
            store.create(&r).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_transition_is_exclusive() {
        let store = MemoryJobStore::new();
        store
            .create(&record("a", JobType::Scheduled, Utc::now()))
            .await
            .unwrap();

        let won = store
            .transition_status("a", JobStatus::Pending, JobStatus::Queued)
            .await
            .unwrap();
        assert!(won);

        // Second claim on the same edge loses
        let won_again = store
            .transition_status("a", JobStatus::Pending, JobStatus::Queued)
            .await
            .unwrap();
        assert!(!won_again);

        let stored = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_concurrent_claims_yield_one_winner() {
        let store = MemoryJobStore::new();
        store
            .create(&record("race", JobType::Immediate, Utc::now()))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .transition_status("race", JobStatus::Pending, JobStatus::Queued)
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(
            store.get("race").await.unwrap().unwrap().status,
            JobStatus::Queued
        );
    }

    #[tokio::test]
    async fn test_transition_missing_job_is_false() {
        let store = MemoryJobStore::new();
        let won = store
            .transition_status("ghost", JobStatus::Pending, JobStatus::Queued)
            .await
            .unwrap();
        assert!(!won);
    }

    #[tokio::test]
    async fn test_update_status_applies_patch() {
        let store = MemoryJobStore::new();
        store
            .create(&record("a", JobType::Scheduled, Utc::now()))
            .await
            .unwrap();

        let mut patch = AttributePatch::new();
        patch.insert(
            "bundle_key".to_string(),
            Some(serde_json::json!("jobs/a/bundle.json")),
        );
        store
            .update_status("a", JobStatus::Running, &patch)
            .await
            .unwrap();

        let stored = store.get("a").await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        assert_eq!(
            stored.attributes.get("bundle_key"),
            Some(&serde_json::json!("jobs/a/bundle.json"))
        );

        // None removes the attribute
        let mut clear = AttributePatch::new();
        clear.insert("bundle_key".to_string(), None);
        store
            .update_status("a", JobStatus::Running, &clear)
            .await
            .unwrap();
        let stored = store.get("a").await.unwrap().unwrap();
        assert!(stored.attributes.get("bundle_key").is_none());
    }

    #[tokio::test]
    async fn test_due_query_respects_cutoff_and_order() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        store
            .create(&record("late", JobType::Scheduled, now + Duration::hours(1)))
            .await
            .unwrap();
        store
            .create(&record("older", JobType::Scheduled, now - Duration::hours(2)))
            .await
            .unwrap();
        store
            .create(&record("old", JobType::Scheduled, now - Duration::hours(1)))
            .await
            .unwrap();
        store
            .create(&record("urgent", JobType::Immediate, now - Duration::hours(3)))
            .await
            .unwrap();

        let due = store.query_due_before(now, 10).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, vec!["older", "old"]);

        let immediate = store.query_immediate(10).await.unwrap();
        assert_eq!(immediate.len(), 1);
        assert_eq!(immediate[0].job_id, "urgent");
    }

    #[tokio::test]
    async fn test_queries_exclude_non_pending() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        store
            .create(&record("a", JobType::Scheduled, now - Duration::hours(1)))
            .await
            .unwrap();
        store
            .transition_status("a", JobStatus::Pending, JobStatus::Queued)
            .await
            .unwrap();

        assert!(store.query_due_before(now, 10).await.unwrap().is_empty());
    }
}
