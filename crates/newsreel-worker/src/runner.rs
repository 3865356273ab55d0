//! Pipeline runner: the article -> script -> chunks -> prompts -> clips
//! -> final video machinery behind the workflow actions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use newsreel_models::{
    ArticleInfo, Chunk, ChunkPlan, ClipAsset, ClipPrompt, PipelineBundle, PipelineConfig,
    ScriptPlan,
};
use newsreel_providers::{
    captions, CaptionCue, MediaProvider, MusicComposer, ScriptEngine, Stitcher, VoiceSynthesizer,
};

use crate::article::ArticleFetcher;
use crate::error::{WorkerError, WorkerResult};

/// Narration speaking rate used for duration estimates.
const WORDS_PER_SECOND: f64 = 2.5;

/// Clip durations the render providers accept.
const ALLOWED_DURATIONS: [f64; 3] = [4.0, 8.0, 12.0];

const DEFAULT_TARGET_DURATION: f64 = 60.0;

/// One job's pipeline, step by step. Implementations must be safe to
/// re-run any step against a bundle that already contains its results.
#[async_trait]
pub trait PipelineRunner: Send + Sync {
    /// Build the bundle up to the prompt stage.
    async fn run_prompts(&self, article_url: &str, dry_run: bool) -> WorkerResult<PipelineBundle>;

    /// Render one clip into `run_dir` and record it in the bundle.
    async fn render_clip(
        &self,
        bundle: &mut PipelineBundle,
        clip_id: &str,
        run_dir: &Path,
        dry_run: bool,
    ) -> WorkerResult<ClipAsset>;

    /// Produce the final video and record its path in the bundle.
    async fn stitch_final(
        &self,
        bundle: &mut PipelineBundle,
        run_dir: &Path,
        dry_run: bool,
    ) -> WorkerResult<()>;
}

/// The production pipeline runner.
pub struct MediaPipelineRunner {
    fetcher: ArticleFetcher,
    script_engine: Arc<dyn ScriptEngine>,
    media: Arc<dyn MediaProvider>,
    voice: Arc<dyn VoiceSynthesizer>,
    /// Background music is optional; without a composer the final video
    /// carries narration only.
    music: Option<Arc<dyn MusicComposer>>,
    stitcher: Arc<dyn Stitcher>,
    config: PipelineConfig,
}

impl MediaPipelineRunner {
    pub fn new(
        script_engine: Arc<dyn ScriptEngine>,
        media: Arc<dyn MediaProvider>,
        voice: Arc<dyn VoiceSynthesizer>,
        music: Option<Arc<dyn MusicComposer>>,
        stitcher: Arc<dyn Stitcher>,
        config: PipelineConfig,
    ) -> WorkerResult<Self> {
        Ok(Self {
            fetcher: ArticleFetcher::new()?,
            script_engine,
            media,
            voice,
            music,
            stitcher,
            config,
        })
    }

    fn target_duration(&self) -> f64 {
        self.config
            .get("target_duration_seconds")
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_TARGET_DURATION)
    }

    /// One chunk per script beat, with a provider-friendly duration.
    fn plan_chunks(script: &ScriptPlan) -> ChunkPlan {
        let mut chunks = Vec::with_capacity(script.beats.len());
        let mut cursor = 0.0f64;

        for (index, beat) in script.beats.iter().enumerate() {
            let words = beat.narration.split_whitespace().count() as f64;
            let estimate = words / WORDS_PER_SECOND;
            let duration = ALLOWED_DURATIONS
                .iter()
                .copied()
                .find(|d| *d >= estimate)
                .unwrap_or(ALLOWED_DURATIONS[ALLOWED_DURATIONS.len() - 1]);

            chunks.push(Chunk {
                clip_id: format!("clip-{:03}", index + 1),
                text: beat.narration.clone(),
                start_seconds: cursor,
                end_seconds: cursor + duration,
            });
            cursor += duration;
        }

        ChunkPlan { chunks }
    }

    fn build_prompts(article: &ArticleInfo, script: &ScriptPlan, plan: &ChunkPlan) -> Vec<ClipPrompt> {
        plan.chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut prompt = format!("News story about {}.", article.title);
                if let Some(direction) = script
                    .beats
                    .get(index)
                    .and_then(|b| b.visual_direction.as_deref())
                {
                    prompt.push_str(&format!(" Focus on {}.", direction));
                }
                prompt.push_str(" Vertical 9:16 frame, optimized for smartphone viewing.");
                prompt.push_str(" Avoid any on-screen text or subtitles.");
                prompt.push_str(&format!(
                    " Ensure visuals support this narration: {}",
                    chunk.text
                ));

                ClipPrompt {
                    clip_id: chunk.clip_id.clone(),
                    prompt,
                    duration_seconds: chunk.duration_seconds(),
                }
            })
            .collect()
    }

    fn full_transcript(script: &ScriptPlan) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(script.beats.len() + 1);
        if let Some(hook) = script.hook.as_deref() {
            parts.push(hook);
        }
        parts.extend(script.beats.iter().map(|b| b.narration.as_str()));
        parts.join(" ")
    }

    /// Music can be switched off per job via the `music` override.
    fn music_enabled(&self) -> bool {
        self.config
            .get("music")
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }

    fn music_prompt(article: &ArticleInfo) -> String {
        format!(
            "Instrumental news-documentary underscore for a story titled \"{}\". \
             Tense, driving, modern. No vocals.",
            article.title
        )
    }

    /// End of the last chunk, i.e. the narration timeline length.
    fn timeline_seconds(plan: &ChunkPlan) -> f64 {
        plan.chunks.last().map(|c| c.end_seconds).unwrap_or(0.0)
    }

    /// One caption per chunk, windowed by the chunk's narration timing.
    fn caption_cues(plan: &ChunkPlan) -> Vec<CaptionCue> {
        plan.chunks
            .iter()
            .map(|chunk| CaptionCue {
                start_seconds: chunk.start_seconds,
                end_seconds: chunk.end_seconds,
                text: chunk.text.clone(),
            })
            .collect()
    }
}

/// Path of `target` relative to `run_dir`, as stored in the bundle.
fn relative_to(run_dir: &Path, target: &Path) -> WorkerResult<String> {
    target
        .strip_prefix(run_dir)
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(|_| {
            WorkerError::job_failed(format!(
                "artifact {} escaped the run directory",
                target.display()
            ))
        })
}

#[async_trait]
impl PipelineRunner for MediaPipelineRunner {
    async fn run_prompts(&self, article_url: &str, _dry_run: bool) -> WorkerResult<PipelineBundle> {
        let article = self.fetcher.fetch(article_url).await?;
        let script = self
            .script_engine
            .generate_script(&article, self.target_duration())
            .await?;
        let chunks = Self::plan_chunks(&script);
        let prompts = Self::build_prompts(&article, &script, &chunks);

        info!(
            "Planned {} clips for {}",
            prompts.len(),
            article.slug
        );

        Ok(PipelineBundle {
            article,
            script,
            chunks,
            prompts,
            clip_assets: Vec::new(),
            narration_audio: None,
            narration_alignment: None,
            music_track: None,
            captions: None,
            final_video: None,
        })
    }

    async fn render_clip(
        &self,
        bundle: &mut PipelineBundle,
        clip_id: &str,
        run_dir: &Path,
        dry_run: bool,
    ) -> WorkerResult<ClipAsset> {
        let prompt = bundle
            .prompt_for(clip_id)
            .ok_or_else(|| {
                WorkerError::validation(format!("no prompt for clip {}", clip_id))
            })?
            .clone();

        let relative = format!("clips/{}.mp4", clip_id);
        let target = run_dir.join(&relative);
        self.media.submit_prompt(&prompt, &target, dry_run).await?;

        bundle.upsert_clip_asset(clip_id, relative.as_str());
        Ok(ClipAsset {
            clip_id: clip_id.to_string(),
            path: relative,
        })
    }

    async fn stitch_final(
        &self,
        bundle: &mut PipelineBundle,
        run_dir: &Path,
        dry_run: bool,
    ) -> WorkerResult<()> {
        // Narration is synthesized once; a re-run reuses the stored path
        if bundle.narration_audio.is_none() {
            let transcript = Self::full_transcript(&bundle.script);
            let narration = self
                .voice
                .synthesize(&transcript, &run_dir.join("narration.mp3"), dry_run)
                .await?;
            bundle.narration_audio = Some(relative_to(run_dir, &narration.audio)?);
            bundle.narration_alignment = narration
                .alignment
                .as_deref()
                .map(|p| relative_to(run_dir, p))
                .transpose()?;
        }

        // Same for the music track, when a composer is configured
        if bundle.music_track.is_none() && self.music_enabled() {
            if let Some(composer) = &self.music {
                let music_rel = "music.mp3".to_string();
                composer
                    .compose(
                        &Self::music_prompt(&bundle.article),
                        Self::timeline_seconds(&bundle.chunks),
                        &run_dir.join(&music_rel),
                        dry_run,
                    )
                    .await?;
                bundle.music_track = Some(music_rel);
            }
        }

        // Captions derive from the chunk timing, so rebuilding them is
        // cheap and deterministic
        if bundle.captions.is_none() {
            let captions_rel = "captions.ass".to_string();
            captions::write_ass(
                &Self::caption_cues(&bundle.chunks),
                &run_dir.join(&captions_rel),
            )
            .await?;
            bundle.captions = Some(captions_rel);
        }

        let mut clip_paths = Vec::with_capacity(bundle.chunks.chunks.len());
        for chunk in &bundle.chunks.chunks {
            let asset = bundle.asset_for(&chunk.clip_id).ok_or_else(|| {
                WorkerError::job_failed(format!("clip {} was never rendered", chunk.clip_id))
            })?;
            clip_paths.push(run_dir.join(&asset.path));
        }

        let final_rel = "exports/final.mp4".to_string();
        let target = run_dir.join(&final_rel);

        if dry_run {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, b"").await?;
        } else {
            let narration = bundle.narration_audio.as_ref().map(|rel| run_dir.join(rel));
            let music = bundle.music_track.as_ref().map(|rel| run_dir.join(rel));
            let subs = bundle.captions.as_ref().map(|rel| run_dir.join(rel));
            self.stitcher
                .stitch(
                    &clip_paths,
                    narration.as_deref(),
                    music.as_deref(),
                    subs.as_deref(),
                    &target,
                )
                .await?;
        }

        bundle.final_video = Some(final_rel);
        Ok(())
    }
}

/// Builds a runner for a pipeline-config override map.
pub type RunnerFactory =
    dyn Fn(&PipelineConfig) -> WorkerResult<Arc<dyn PipelineRunner>> + Send + Sync;

/// Cache of runners keyed by the canonical JSON signature of their config
/// overrides, so repeated jobs with the same overrides share one runner.
pub struct RunnerCache {
    factory: Box<RunnerFactory>,
    cache: Mutex<HashMap<String, Arc<dyn PipelineRunner>>>,
}

impl RunnerCache {
    pub fn new(factory: Box<RunnerFactory>) -> Self {
        Self {
            factory,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Config signature: serialized with sorted keys at every level.
    pub fn signature(config: &PipelineConfig) -> String {
        serde_json::to_string(config).unwrap_or_else(|_| "{}".to_string())
    }

    pub async fn get(&self, config: &PipelineConfig) -> WorkerResult<Arc<dyn PipelineRunner>> {
        let signature = Self::signature(config);
        let mut cache = self.cache.lock().await;
        if let Some(runner) = cache.get(&signature) {
            return Ok(Arc::clone(runner));
        }
        let runner = (self.factory)(config)?;
        cache.insert(signature, Arc::clone(&runner));
        Ok(runner)
    }

    /// Number of distinct runners built so far.
    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }
}
