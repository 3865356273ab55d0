//! Object key layout.
//!
//! One prefix per job:
//!
//! ```text
//! jobs/{job_id}/bundle.json     pipeline bundle (durable step state)
//! jobs/{job_id}/run/...         working artifacts mirrored from the run dir
//! jobs/final/{job_id}-{file}    final video when the run yields one file
//! jobs/final/{job_id}/{rel}     final artifacts when the run yields a tree
//! ```

/// Key of the job's pipeline bundle.
pub fn bundle_key(job_id: &str) -> String {
    format!("jobs/{}/bundle.json", job_id)
}

/// Prefix under which the job's working artifacts are mirrored.
pub fn run_prefix(job_id: &str) -> String {
    format!("jobs/{}/run", job_id)
}

/// Key of a single final video file.
pub fn final_video_key(job_id: &str, filename: &str) -> String {
    format!("jobs/final/{}-{}", job_id, filename)
}

/// Key of one file inside a final artifact tree.
pub fn final_asset_key(job_id: &str, relative_path: &str) -> String {
    format!("jobs/final/{}/{}", job_id, relative_path)
}

/// Guess a content type from a file extension.
pub fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("json") => "application/json",
        Some("srt") | Some("vtt") | Some("txt") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_key_layout() {
        assert_eq!(bundle_key("my-story"), "jobs/my-story/bundle.json");
        assert_eq!(run_prefix("my-story"), "jobs/my-story/run");
        assert_eq!(
            final_video_key("my-story", "final.mp4"),
            "jobs/final/my-story-final.mp4"
        );
        assert_eq!(
            final_asset_key("my-story", "clips/clip-1.mp4"),
            "jobs/final/my-story/clips/clip-1.mp4"
        );
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a/final.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("bundle.json")), "application/json");
        assert_eq!(content_type_for(Path::new("mystery")), "application/octet-stream");
    }
}
