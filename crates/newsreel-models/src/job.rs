//! Job record and lifecycle types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a payload cannot be processed. Never retried; the job is
/// rejected at ingest or routed straight to MARK_FAILED.
#[derive(Debug, Clone, Error)]
#[error("validation error: {0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Current state of a job in the durable store.
///
/// Statuses only ever advance along
/// `PENDING -> QUEUED -> RUNNING -> {COMPLETED | FAILED}`, with the single
/// exception that any non-terminal status may move directly to `FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created by ingest, not yet claimed by a scheduler
    #[default]
    Pending,
    /// Claimed by a scheduler and dispatched to the queue
    Queued,
    /// A worker has started the pipeline
    Running,
    /// Final video produced and uploaded
    Completed,
    /// Terminal failure, `error_message` attribute populated
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "QUEUED" => Some(JobStatus::Queued),
            "RUNNING" => Some(JobStatus::Running),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the directed lifecycle graph has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if !self.is_terminal() && next == JobStatus::Failed {
            return true;
        }
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Queued)
                | (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a job is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    /// Dispatched once `scheduled_datetime` has passed
    #[default]
    Scheduled,
    /// Dispatched on the next scheduler pass regardless of schedule time
    Immediate,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Scheduled => "SCHEDULED",
            JobType::Immediate => "IMMEDIATE",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Well-known keys in the accumulated attribute map.
pub mod attribute_keys {
    pub const OUTPUT_BUCKET: &str = "output_bucket";
    pub const OUTPUT_PREFIX: &str = "output_prefix";
    pub const BUNDLE_KEY: &str = "bundle_key";
    pub const FINAL_VIDEO_KEY: &str = "final_video_key";
    pub const ERROR_MESSAGE: &str = "error_message";
}

/// Attribute merge applied alongside an unconditional status update.
///
/// A `None` value removes the field; `Some` sets it. Keys not present are
/// left untouched.
pub type AttributePatch = BTreeMap<String, Option<serde_json::Value>>;

/// A durably stored job, keyed by its slug-derived id.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    /// Slug derived deterministically from `url`
    pub job_id: String,

    /// Source article URL
    pub url: String,

    /// Scheduling mode
    #[serde(default)]
    pub job_type: JobType,

    /// Lifecycle status
    #[serde(default)]
    pub status: JobStatus,

    /// When the job becomes due (always set; "now" for immediate jobs)
    pub scheduled_datetime: DateTime<Utc>,

    /// Free-form caller metadata; may embed a `pipeline_config` override map
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Refreshed on every status transition and attribute update
    pub updated_at: DateTime<Utc>,

    /// Accumulated bookkeeping (output bucket/prefix, bundle key, final
    /// artifact key, error message)
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl JobRecord {
    /// Create a fresh PENDING record.
    pub fn new(
        job_id: impl Into<String>,
        url: impl Into<String>,
        job_type: JobType,
        scheduled_datetime: DateTime<Utc>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            url: url.into(),
            job_type,
            status: JobStatus::Pending,
            scheduled_datetime,
            metadata,
            created_at: now,
            updated_at: now,
            attributes: BTreeMap::new(),
        }
    }

    /// Pipeline-config overrides embedded in the metadata map, if any.
    pub fn pipeline_config(&self) -> Option<&serde_json::Value> {
        self.metadata.get("pipeline_config")
    }

    fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    pub fn bundle_key(&self) -> Option<&str> {
        self.attribute_str(attribute_keys::BUNDLE_KEY)
    }

    pub fn final_video_key(&self) -> Option<&str> {
        self.attribute_str(attribute_keys::FINAL_VIDEO_KEY)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.attribute_str(attribute_keys::ERROR_MESSAGE)
    }

    /// Apply an attribute patch in place, refreshing `updated_at`.
    pub fn apply_patch(&mut self, status: JobStatus, patch: &AttributePatch) {
        self.status = status;
        self.updated_at = Utc::now();
        for (key, value) in patch {
            match value {
                Some(v) => {
                    self.attributes.insert(key.clone(), v.clone());
                }
                None => {
                    self.attributes.remove(key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(
            "https-example-com-story",
            "https://example.com/story",
            JobType::Immediate,
            Utc::now(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn test_status_path_is_directed() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Queued));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_any_non_terminal_can_fail() {
        for status in [JobStatus::Pending, JobStatus::Queued, JobStatus::Running] {
            assert!(status.can_transition_to(JobStatus::Failed));
        }
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&JobStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
        assert_eq!(JobStatus::parse("COMPLETED"), Some(JobStatus::Completed));
        assert_eq!(JobStatus::parse("nope"), None);
    }

    #[test]
    fn test_apply_patch_sets_and_removes() {
        let mut rec = record();
        let mut patch = AttributePatch::new();
        patch.insert(
            attribute_keys::BUNDLE_KEY.into(),
            Some(serde_json::json!("jobs/x/bundle.json")),
        );
        rec.apply_patch(JobStatus::Running, &patch);
        assert_eq!(rec.status, JobStatus::Running);
        assert_eq!(rec.bundle_key(), Some("jobs/x/bundle.json"));

        let mut remove = AttributePatch::new();
        remove.insert(attribute_keys::BUNDLE_KEY.into(), None);
        rec.apply_patch(JobStatus::Failed, &remove);
        assert_eq!(rec.bundle_key(), None);
    }
}
