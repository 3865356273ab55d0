//! ASS subtitle rendering for burned-in captions.
//!
//! Cues come from the narration timing (one per clip-sized segment); the
//! stitcher burns the resulting file into the final video.

use std::path::Path;

use crate::error::ProviderResult;

/// One caption line with its display window.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCue {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
}

/// Style tuned for 720x1280 vertical video: centered lower third, white
/// text with a heavy outline.
const ASS_HEADER: &str = "\
[Script Info]
ScriptType: v4.00+
PlayResX: 720
PlayResY: 1280
WrapStyle: 0

[V4+ Styles]
Format: Name, Fontname, Fontsize, PrimaryColour, OutlineColour, Bold, Outline, Shadow, Alignment, MarginL, MarginR, MarginV
Style: Default,Arial,52,&H00FFFFFF,&H00000000,1,3,0,2,60,60,220

[Events]
Format: Layer, Start, End, Style, Text
";

/// Render cues as an ASS document.
pub fn render_ass(cues: &[CaptionCue]) -> String {
    let mut out = String::from(ASS_HEADER);
    for cue in cues {
        out.push_str(&format!(
            "Dialogue: 0,{},{},Default,{}\n",
            ass_timestamp(cue.start_seconds),
            ass_timestamp(cue.end_seconds),
            escape_text(&cue.text),
        ));
    }
    out
}

/// Render cues and write them to `target`.
pub async fn write_ass(cues: &[CaptionCue], target: &Path) -> ProviderResult<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, render_ass(cues)).await?;
    Ok(())
}

/// ASS timestamps are `H:MM:SS.CS` with centisecond precision.
fn ass_timestamp(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_secs = total_cs / 100;
    let s = total_secs % 60;
    let m = (total_secs / 60) % 60;
    let h = total_secs / 3600;
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

fn escape_text(text: &str) -> String {
    // Newlines become ASS line breaks; braces would open override blocks
    text.replace('\n', "\\N")
        .replace('{', "(")
        .replace('}', ")")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_format() {
        assert_eq!(ass_timestamp(0.0), "0:00:00.00");
        assert_eq!(ass_timestamp(7.25), "0:00:07.25");
        assert_eq!(ass_timestamp(61.5), "0:01:01.50");
        assert_eq!(ass_timestamp(3723.0), "1:02:03.00");
    }

    #[test]
    fn test_render_contains_styled_dialogue() {
        let cues = vec![
            CaptionCue {
                start_seconds: 0.0,
                end_seconds: 4.0,
                text: "Markets opened lower.".to_string(),
            },
            CaptionCue {
                start_seconds: 4.0,
                end_seconds: 12.0,
                text: "Analysts expect a rebound.".to_string(),
            },
        ];
        let ass = render_ass(&cues);
        assert!(ass.starts_with("[Script Info]"));
        assert!(ass.contains("Dialogue: 0,0:00:00.00,0:00:04.00,Default,Markets opened lower."));
        assert!(ass.contains("Dialogue: 0,0:00:04.00,0:00:12.00,Default,Analysts expect a rebound."));
    }

    #[test]
    fn test_text_is_escaped() {
        let cues = vec![CaptionCue {
            start_seconds: 0.0,
            end_seconds: 1.0,
            text: "line one\nline {two}".to_string(),
        }];
        let ass = render_ass(&cues);
        assert!(ass.contains("line one\\Nline (two)"));
    }

    #[tokio::test]
    async fn test_write_ass_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("subs/captions.ass");
        let cues = vec![CaptionCue {
            start_seconds: 0.0,
            end_seconds: 2.0,
            text: "Hello.".to_string(),
        }];
        write_ass(&cues, &target).await.unwrap();
        let written = tokio::fs::read_to_string(&target).await.unwrap();
        assert!(written.contains("Hello."));
    }
}
