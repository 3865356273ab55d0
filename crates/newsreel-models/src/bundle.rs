//! The pipeline bundle: the durable snapshot of one job's progress.
//!
//! The bundle is the single source of truth for resumability. Any step can be
//! re-run by reloading the bundle, recomputing only the missing piece, and
//! re-saving. Steps add or overwrite only their own fields, never another
//! step's.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Article metadata and extracted text.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArticleInfo {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Deterministic slug; must equal the job id that created this bundle
    pub slug: String,
    pub text: String,
}

/// One narrative beat of the generated script.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScriptBeat {
    pub id: u32,
    /// Narration text for this beat
    pub narration: String,
    /// Visual direction handed to the prompt builder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_direction: Option<String>,
}

/// The generated narration script.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScriptPlan {
    pub beats: Vec<ScriptBeat>,
    /// Opening hook line, when the script engine produced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
}

/// A clip-sized transcript segment with narration timing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Chunk {
    pub clip_id: String,
    pub text: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl Chunk {
    pub fn duration_seconds(&self) -> f64 {
        (self.end_seconds - self.start_seconds).max(0.0)
    }
}

/// Ordered chunk plan; clip ids derive their ordering from here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
}

/// Render prompt for one clip.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClipPrompt {
    pub clip_id: String,
    pub prompt: String,
    pub duration_seconds: f64,
}

/// A rendered clip asset, path relative to the run directory.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClipAsset {
    pub clip_id: String,
    pub path: String,
}

/// Durable, versioned snapshot of pipeline progress for one job, stored at
/// `jobs/{job_id}/bundle.json`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineBundle {
    pub article: ArticleInfo,
    pub script: ScriptPlan,
    pub chunks: ChunkPlan,
    pub prompts: Vec<ClipPrompt>,
    /// Rendered clip assets, at most one entry per clip id
    #[serde(default)]
    pub clip_assets: Vec<ClipAsset>,
    /// Narration audio path, relative to the run directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration_audio: Option<String>,
    /// Word-level alignment payload path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration_alignment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_track: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captions: Option<String>,
    /// Final stitched video path, set by the stitch step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_video: Option<String>,
}

impl PipelineBundle {
    /// Clip ids in chunk-plan order.
    pub fn clip_ids(&self) -> Vec<String> {
        self.chunks.chunks.iter().map(|c| c.clip_id.clone()).collect()
    }

    pub fn prompt_for(&self, clip_id: &str) -> Option<&ClipPrompt> {
        self.prompts.iter().find(|p| p.clip_id == clip_id)
    }

    pub fn asset_for(&self, clip_id: &str) -> Option<&ClipAsset> {
        self.clip_assets.iter().find(|a| a.clip_id == clip_id)
    }

    /// Record a rendered asset. Last write wins for a given clip id, so
    /// duplicate step invocations never produce duplicate entries.
    pub fn upsert_clip_asset(&mut self, clip_id: impl Into<String>, path: impl Into<String>) {
        let clip_id = clip_id.into();
        let path = path.into();
        if let Some(existing) = self.clip_assets.iter_mut().find(|a| a.clip_id == clip_id) {
            existing.path = path;
        } else {
            self.clip_assets.push(ClipAsset { clip_id, path });
        }
    }

    /// True once every chunk has a rendered asset.
    pub fn all_clips_rendered(&self) -> bool {
        self.chunks
            .chunks
            .iter()
            .all(|c| self.asset_for(&c.clip_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_bundle(clips: &[&str]) -> PipelineBundle {
        let chunks: Vec<Chunk> = clips
            .iter()
            .enumerate()
            .map(|(i, id)| Chunk {
                clip_id: (*id).to_string(),
                text: format!("segment {i}"),
                start_seconds: i as f64 * 5.0,
                end_seconds: (i as f64 + 1.0) * 5.0,
            })
            .collect();
        let prompts = chunks
            .iter()
            .map(|c| ClipPrompt {
                clip_id: c.clip_id.clone(),
                prompt: format!("render {}", c.clip_id),
                duration_seconds: c.duration_seconds(),
            })
            .collect();
        PipelineBundle {
            article: ArticleInfo {
                url: "https://example.com/story".into(),
                title: "Story".into(),
                byline: None,
                published_at: None,
                source: None,
                slug: "https-example-com-story".into(),
                text: "body".into(),
            },
            script: ScriptPlan { beats: vec![], hook: None },
            chunks: ChunkPlan { chunks },
            prompts,
            clip_assets: vec![],
            narration_audio: None,
            narration_alignment: None,
            music_track: None,
            captions: None,
            final_video: None,
        }
    }

    #[test]
    fn test_clip_ids_preserve_chunk_order() {
        let bundle = sample_bundle(&["clip-1", "clip-2", "clip-3"]);
        assert_eq!(bundle.clip_ids(), vec!["clip-1", "clip-2", "clip-3"]);
    }

    #[test]
    fn test_upsert_is_last_write_wins() {
        let mut bundle = sample_bundle(&["clip-1"]);
        bundle.upsert_clip_asset("clip-1", "clips/clip-1.mp4");
        bundle.upsert_clip_asset("clip-1", "clips/clip-1-v2.mp4");
        assert_eq!(bundle.clip_assets.len(), 1);
        assert_eq!(bundle.asset_for("clip-1").unwrap().path, "clips/clip-1-v2.mp4");
    }

    #[test]
    fn test_all_clips_rendered() {
        let mut bundle = sample_bundle(&["clip-1", "clip-2"]);
        assert!(!bundle.all_clips_rendered());
        bundle.upsert_clip_asset("clip-1", "clips/clip-1.mp4");
        bundle.upsert_clip_asset("clip-2", "clips/clip-2.mp4");
        assert!(bundle.all_clips_rendered());
    }

    #[test]
    fn test_bundle_json_round_trip() {
        let mut bundle = sample_bundle(&["clip-1"]);
        bundle.final_video = Some("exports/final.mp4".into());
        let json = serde_json::to_string_pretty(&bundle).unwrap();
        let back: PipelineBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(back.final_video.as_deref(), Some("exports/final.mp4"));
        assert_eq!(back.clip_ids(), bundle.clip_ids());
    }
}
