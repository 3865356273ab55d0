//! Cross-step payloads: the dispatch message and the run context.
//!
//! Both use camelCase wire shapes because they travel through queue messages
//! and state-machine step inputs. They are validated on deserialization at
//! every action entry point rather than trusted as free-form maps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobRecord, JobType, ValidationError};

/// Pipeline-config override map, keyed by canonical option name.
///
/// `BTreeMap` keeps key order stable, so the serialized form doubles as the
/// cache signature for runner construction.
pub type PipelineConfig = BTreeMap<String, serde_json::Value>;

/// Message published to the dispatch queue after a successful
/// PENDING -> QUEUED claim.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchMessage {
    pub job_id: String,
    pub url: String,
    pub scheduled_datetime: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub job_type: JobType,
}

impl DispatchMessage {
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            url: record.url.clone(),
            scheduled_datetime: record.scheduled_datetime,
            metadata: record.metadata.clone(),
            job_type: record.job_type,
        }
    }

    /// Pipeline-config overrides embedded in the metadata, if any.
    pub fn pipeline_config(&self) -> Option<PipelineConfig> {
        let value = self.metadata.get("pipeline_config")?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.job_id.is_empty() {
            return Err(ValidationError::new("dispatch message missing jobId"));
        }
        if self.url.is_empty() {
            return Err(ValidationError::new("dispatch message missing url"));
        }
        Ok(())
    }
}

/// Ephemeral context threading job identity and paths between pipeline steps.
///
/// Created by GENERATE_PROMPTS, read and extended by every subsequent step,
/// discarded after STITCH_FINAL or MARK_FAILED. Never persisted to the job
/// store, only to step payloads and logs.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunContext {
    pub job_id: String,
    pub article_url: String,
    /// Object-storage key of the pipeline bundle
    pub bundle_key: String,
    /// Object-storage prefix of the run working directory
    pub output_prefix: String,
    /// Ordered clip ids the state machine fans out over
    pub clip_ids: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_config: Option<PipelineConfig>,
}

impl RunContext {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.job_id.is_empty() {
            return Err(ValidationError::new("run context missing jobId"));
        }
        if self.bundle_key.is_empty() || self.output_prefix.is_empty() {
            return Err(ValidationError::new(
                "run context missing bundleKey/outputPrefix",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_message_wire_shape() {
        let msg = DispatchMessage {
            job_id: "id".into(),
            url: "https://example.com".into(),
            scheduled_datetime: Utc::now(),
            metadata: BTreeMap::new(),
            job_type: JobType::Immediate,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("jobId").is_some());
        assert!(json.get("scheduledDatetime").is_some());
        assert_eq!(json["jobType"], "IMMEDIATE");
    }

    #[test]
    fn test_run_context_round_trip() {
        let ctx = RunContext {
            job_id: "job".into(),
            article_url: "https://example.com".into(),
            bundle_key: "jobs/job/bundle.json".into(),
            output_prefix: "jobs/job/run".into(),
            clip_ids: vec!["clip-1".into(), "clip-2".into()],
            dry_run: true,
            pipeline_config: None,
        };
        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("\"bundleKey\""));
        let back: RunContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back.clip_ids, ctx.clip_ids);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_run_context_validation_rejects_empty_keys() {
        let ctx = RunContext {
            job_id: "job".into(),
            article_url: "u".into(),
            bundle_key: String::new(),
            output_prefix: "p".into(),
            clip_ids: vec![],
            dry_run: false,
            pipeline_config: None,
        };
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn test_pipeline_config_extraction() {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "pipeline_config".to_string(),
            serde_json::json!({"provider": "veo"}),
        );
        let msg = DispatchMessage {
            job_id: "id".into(),
            url: "u".into(),
            scheduled_datetime: Utc::now(),
            metadata,
            job_type: JobType::Scheduled,
        };
        let config = msg.pipeline_config().unwrap();
        assert_eq!(config.get("provider"), Some(&serde_json::json!("veo")));
    }
}
