//! Durable job store.
//!
//! The store is the single source of truth for job lifecycle state. All
//! status writes that gate side effects go through [`JobStore::transition_status`],
//! a compare-and-swap: it succeeds for exactly one caller per (expected,
//! new) edge, which is how dispatch stays at-most-once under concurrent
//! schedulers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use newsreel_models::{AttributePatch, JobRecord, JobStatus, JobType};

use crate::client::FirestoreClient;
use crate::error::{StoreError, StoreResult};
use crate::metrics::record_cas_lost;
use crate::retry::with_retry;
use crate::types::{
    fields_to_record, record_to_fields, CollectionSelector, FieldReference, Filter, Order,
    StructuredQuery, Value,
};

/// Abstraction over the durable job store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job record. Fails with [`StoreError::AlreadyExists`]
    /// if a job with the same id already exists.
    async fn create(&self, record: &JobRecord) -> StoreResult<()>;

    /// Overwrite a job unconditionally. Used by ingest to refresh a
    /// re-submitted job that is still PENDING.
    async fn replace(&self, record: &JobRecord) -> StoreResult<()>;

    /// Fetch a job by id. Absence is `Ok(None)`.
    async fn get(&self, job_id: &str) -> StoreResult<Option<JobRecord>>;

    /// Atomically transition a job from `expected` to `new`.
    ///
    /// Returns `Ok(true)` when this caller won the transition, `Ok(false)`
    /// when the job was missing or no longer in `expected` (a concurrent
    /// writer got there first). A `false` return is a normal skip, not an
    /// error.
    async fn transition_status(
        &self,
        job_id: &str,
        expected: JobStatus,
        new: JobStatus,
    ) -> StoreResult<bool>;

    /// Unconditionally set the status and apply an attribute patch.
    ///
    /// A `Some(value)` entry sets the attribute, a `None` entry removes it.
    /// Used by the worker for RUNNING / COMPLETED / FAILED writes, which
    /// must land regardless of intervening state.
    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        patch: &AttributePatch,
    ) -> StoreResult<()>;

    /// Scheduled PENDING jobs whose scheduled time is at or before
    /// `cutoff`, oldest first.
    async fn query_due_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i32,
    ) -> StoreResult<Vec<JobRecord>>;

    /// Immediate PENDING jobs, oldest first.
    async fn query_immediate(&self, limit: i32) -> StoreResult<Vec<JobRecord>>;
}

/// Firestore-backed job store.
#[derive(Clone)]
pub struct FirestoreJobStore {
    client: FirestoreClient,
    collection: String,
}

impl FirestoreJobStore {
    pub fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    /// Create from environment variables. `JOBS_COLLECTION` overrides the
    /// collection name (default "jobs").
    pub async fn from_env() -> StoreResult<Self> {
        let client = FirestoreClient::from_env().await?;
        let collection =
            std::env::var("JOBS_COLLECTION").unwrap_or_else(|_| "jobs".to_string());
        Ok(Self::new(client, collection))
    }

    fn pending_query(&self, job_type: JobType, extra: Option<Filter>, limit: i32) -> StructuredQuery {
        let mut filters = vec![
            Filter::field(
                "status",
                "EQUAL",
                Value::StringValue(JobStatus::Pending.as_str().to_string()),
            ),
            Filter::field(
                "job_type",
                "EQUAL",
                Value::StringValue(job_type.as_str().to_string()),
            ),
        ];
        if let Some(f) = extra {
            filters.push(f);
        }

        StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: self.collection.clone(),
                all_descendants: None,
            }],
            r#where: Some(Filter::and(filters)),
            order_by: Some(vec![Order {
                field: FieldReference {
                    field_path: "scheduled_datetime".to_string(),
                },
                direction: "ASCENDING".to_string(),
            }]),
            limit: Some(limit),
        }
    }

    async fn run_records_query(&self, query: StructuredQuery) -> StoreResult<Vec<JobRecord>> {
        let docs = with_retry(self.client.retry_config(), "run_query", || {
            self.client.run_query(query.clone())
        })
        .await?;

        // One malformed document must not starve the rest of the batch
        let mut records = Vec::with_capacity(docs.len());
        for doc in docs.iter().filter_map(|d| d.fields.as_ref()) {
            match fields_to_record(doc) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping malformed job document: {}", e),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl JobStore for FirestoreJobStore {
    async fn create(&self, record: &JobRecord) -> StoreResult<()> {
        let fields = record_to_fields(record);
        self.client
            .create_document(&self.collection, &record.job_id, fields)
            .await?;
        Ok(())
    }

    async fn replace(&self, record: &JobRecord) -> StoreResult<()> {
        let fields = record_to_fields(record);
        // A patch without a mask replaces the whole document
        self.client
            .patch_document(&self.collection, &record.job_id, fields, None, None)
            .await?;
        Ok(())
    }

    async fn get(&self, job_id: &str) -> StoreResult<Option<JobRecord>> {
        let doc = with_retry(self.client.retry_config(), "get_job", || {
            self.client.get_document(&self.collection, job_id)
        })
        .await?;

        match doc.and_then(|d| d.fields) {
            Some(fields) => Ok(Some(fields_to_record(&fields)?)),
            None => Ok(None),
        }
    }

    async fn transition_status(
        &self,
        job_id: &str,
        expected: JobStatus,
        new: JobStatus,
    ) -> StoreResult<bool> {
        let doc = match self.client.get_document(&self.collection, job_id).await? {
            Some(doc) => doc,
            None => return Ok(false),
        };

        let current = doc
            .fields
            .as_ref()
            .map(fields_to_record)
            .transpose()?
            .map(|r| r.status);
        if current != Some(expected) {
            debug!(
                job_id = %job_id,
                current = ?current,
                expected = %expected,
                "transition skipped, status changed underneath us"
            );
            return Ok(false);
        }

        let update_time = doc.update_time.as_deref().ok_or_else(|| {
            StoreError::InvalidResponse(format!("job {} document missing updateTime", job_id))
        })?;

        let mut fields = std::collections::HashMap::new();
        fields.insert(
            "status".to_string(),
            Value::StringValue(new.as_str().to_string()),
        );
        fields.insert(
            "updated_at".to_string(),
            Value::TimestampValue(Utc::now().to_rfc3339()),
        );

        let result = self
            .client
            .patch_document(
                &self.collection,
                job_id,
                fields,
                Some(vec!["status".to_string(), "updated_at".to_string()]),
                Some(update_time),
            )
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.is_precondition_failed() => {
                record_cas_lost();
                debug!(job_id = %job_id, "transition lost to a concurrent writer");
                Ok(false)
            }
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        patch: &AttributePatch,
    ) -> StoreResult<()> {
        let mut fields = std::collections::HashMap::new();
        let mut mask = vec!["status".to_string(), "updated_at".to_string()];

        fields.insert(
            "status".to_string(),
            Value::StringValue(status.as_str().to_string()),
        );
        fields.insert(
            "updated_at".to_string(),
            Value::TimestampValue(Utc::now().to_rfc3339()),
        );

        for (key, value) in patch {
            let path = format!("attributes.{}", key);
            mask.push(path.clone());
            if let Some(v) = value {
                // a masked path with no field value is a delete
                fields.insert(path, crate::types::json_to_value(v));
            }
        }

        self.client
            .patch_document(&self.collection, job_id, fields, Some(mask), None)
            .await?;
        Ok(())
    }

    async fn query_due_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i32,
    ) -> StoreResult<Vec<JobRecord>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let due = Filter::field(
            "scheduled_datetime",
            "LESS_THAN_OR_EQUAL",
            Value::TimestampValue(cutoff.to_rfc3339()),
        );
        self.run_records_query(self.pending_query(JobType::Scheduled, Some(due), limit))
            .await
    }

    async fn query_immediate(&self, limit: i32) -> StoreResult<Vec<JobRecord>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        self.run_records_query(self.pending_query(JobType::Immediate, None, limit))
            .await
    }
}
