//! Provider contracts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use newsreel_models::{ArticleInfo, ClipPrompt, ScriptPlan};

use crate::error::ProviderResult;

/// A video generation backend that renders one clip per prompt.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Provider name for logs and config signatures.
    fn name(&self) -> &'static str;

    /// Render one clip to `target`. In dry-run mode an empty placeholder
    /// file is written and no API call is made.
    async fn submit_prompt(
        &self,
        prompt: &ClipPrompt,
        target: &Path,
        dry_run: bool,
    ) -> ProviderResult<PathBuf>;
}

/// Turns an article into a narration script.
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    async fn generate_script(
        &self,
        article: &ArticleInfo,
        target_duration_seconds: f64,
    ) -> ProviderResult<ScriptPlan>;
}

/// Synthesized narration: the audio file plus, when the backend provides
/// one, a word-level alignment payload written next to it.
#[derive(Debug, Clone)]
pub struct Narration {
    pub audio: PathBuf,
    pub alignment: Option<PathBuf>,
}

/// Synthesizes narration audio from script text.
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    /// Write narration audio for `text` to `target`.
    async fn synthesize(&self, text: &str, target: &Path, dry_run: bool)
        -> ProviderResult<Narration>;
}

/// Generates a background music track for the final video.
#[async_trait]
pub trait MusicComposer: Send + Sync {
    /// Write roughly `duration_seconds` of music for `prompt` to `target`.
    async fn compose(
        &self,
        prompt: &str,
        duration_seconds: f64,
        target: &Path,
        dry_run: bool,
    ) -> ProviderResult<PathBuf>;
}

/// Combines rendered clips with narration, music, and burned-in captions
/// into the final video.
#[async_trait]
pub trait Stitcher: Send + Sync {
    async fn stitch(
        &self,
        clip_paths: &[PathBuf],
        narration: Option<&Path>,
        music: Option<&Path>,
        captions: Option<&Path>,
        target: &Path,
    ) -> ProviderResult<PathBuf>;
}

/// Touch an empty placeholder file, creating parent directories.
pub(crate) async fn touch_placeholder(target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, b"").await
}
