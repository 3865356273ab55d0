//! ffmpeg-based clip stitcher.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::traits::Stitcher;

/// Concatenates rendered clips into the final video with ffmpeg.
pub struct FfmpegStitcher {
    ffmpeg_path: String,
}

impl FfmpegStitcher {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
        }
    }

    /// Concat demuxer list file contents.
    fn concat_list(clip_paths: &[PathBuf]) -> ProviderResult<String> {
        let mut list = String::new();
        for path in clip_paths {
            let rendered = path.to_str().ok_or_else(|| {
                ProviderError::StitchFailed(format!("non-UTF8 clip path: {}", path.display()))
            })?;
            // concat demuxer quoting: single quotes, embedded quotes escaped
            list.push_str(&format!("file '{}'\n", rendered.replace('\'', "'\\''")));
        }
        Ok(list)
    }

    /// Assemble the ffmpeg invocation. Without captions the video stream is
    /// copied; burning captions in forces a re-encode. Narration and music
    /// are mixed together when both are present, with music ducked under
    /// the voice.
    fn build_args(
        list_path: &str,
        narration: Option<&str>,
        music: Option<&str>,
        captions: Option<&str>,
        target: &str,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list_path.into(),
        ];

        for audio in [narration, music].into_iter().flatten() {
            args.push("-i".into());
            args.push(audio.into());
        }

        match (narration, music) {
            (Some(_), Some(_)) => {
                args.push("-filter_complex".into());
                args.push(
                    "[1:a][2:a]amix=inputs=2:duration=first:weights=1 0.25[aout]".into(),
                );
                args.push("-map".into());
                args.push("0:v:0".into());
                args.push("-map".into());
                args.push("[aout]".into());
            }
            (Some(_), None) | (None, Some(_)) => {
                args.push("-map".into());
                args.push("0:v:0".into());
                args.push("-map".into());
                args.push("1:a:0".into());
            }
            (None, None) => {}
        }

        match captions {
            Some(subs) => {
                args.push("-vf".into());
                args.push(format!("ass={}", subs));
                args.push("-c:v".into());
                args.push("libx264".into());
                args.push("-preset".into());
                args.push("veryfast".into());
            }
            None => {
                args.push("-c:v".into());
                args.push("copy".into());
            }
        }

        if narration.is_some() || music.is_some() {
            args.push("-c:a".into());
            args.push("aac".into());
            args.push("-shortest".into());
        }

        args.push(target.into());
        args
    }

    async fn run_ffmpeg(&self, args: &[String]) -> ProviderResult<()> {
        debug!("Running {} {}", self.ffmpeg_path, args.join(" "));

        let output = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(10)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(ProviderError::StitchFailed(format!(
                "ffmpeg exited with {}: {}",
                output.status, tail
            )));
        }

        Ok(())
    }
}

impl Default for FfmpegStitcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stitcher for FfmpegStitcher {
    async fn stitch(
        &self,
        clip_paths: &[PathBuf],
        narration: Option<&Path>,
        music: Option<&Path>,
        captions: Option<&Path>,
        target: &Path,
    ) -> ProviderResult<PathBuf> {
        if clip_paths.is_empty() {
            return Err(ProviderError::StitchFailed(
                "no clips to stitch".to_string(),
            ));
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let list_path = target.with_extension("clips.txt");
        tokio::fs::write(&list_path, Self::concat_list(clip_paths)?).await?;

        let list_str = list_path.to_string_lossy().into_owned();
        let narration_str = narration.map(|p| p.to_string_lossy().into_owned());
        let music_str = music.map(|p| p.to_string_lossy().into_owned());
        let captions_str = captions.map(|p| p.to_string_lossy().into_owned());
        let target_str = target.to_string_lossy().into_owned();

        let args = Self::build_args(
            &list_str,
            narration_str.as_deref(),
            music_str.as_deref(),
            captions_str.as_deref(),
            &target_str,
        );
        self.run_ffmpeg(&args).await?;

        tokio::fs::remove_file(&list_path).await.ok();
        info!(
            "Stitched {} clips into {}",
            clip_paths.len(),
            target.display()
        );
        Ok(target.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_quotes_paths() {
        let clips = vec![
            PathBuf::from("/run/clips/clip-1.mp4"),
            PathBuf::from("/run/clips/o'neill.mp4"),
        ];
        let list = FfmpegStitcher::concat_list(&clips).unwrap();
        assert!(list.contains("file '/run/clips/clip-1.mp4'\n"));
        assert!(list.contains("o'\\''neill"));
    }

    #[test]
    fn test_args_copy_video_without_captions() {
        let args =
            FfmpegStitcher::build_args("list.txt", Some("narration.mp3"), None, None, "out.mp4");
        let joined = args.join(" ");
        assert!(joined.contains("-c:v copy"));
        assert!(joined.contains("-map 0:v:0 -map 1:a:0"));
        assert!(joined.contains("-c:a aac -shortest"));
        assert!(!joined.contains("amix"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn test_args_mix_narration_and_music() {
        let args = FfmpegStitcher::build_args(
            "list.txt",
            Some("narration.mp3"),
            Some("music.mp3"),
            None,
            "out.mp4",
        );
        let joined = args.join(" ");
        assert!(joined.contains("-i narration.mp3 -i music.mp3"));
        assert!(joined.contains("amix=inputs=2"));
        assert!(joined.contains("-map [aout]"));
    }

    #[test]
    fn test_args_burn_captions_force_reencode() {
        let args = FfmpegStitcher::build_args(
            "list.txt",
            Some("narration.mp3"),
            None,
            Some("captions.ass"),
            "out.mp4",
        );
        let joined = args.join(" ");
        assert!(joined.contains("-vf ass=captions.ass"));
        assert!(joined.contains("-c:v libx264"));
        assert!(!joined.contains("-c:v copy"));
    }

    #[test]
    fn test_args_bare_concat_copies_everything() {
        let args = FfmpegStitcher::build_args("list.txt", None, None, None, "out.mp4");
        let joined = args.join(" ");
        assert!(joined.contains("-c:v copy"));
        assert!(!joined.contains("-map"));
        assert!(!joined.contains("-shortest"));
    }
}
