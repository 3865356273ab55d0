//! Run-directory artifact sync.
//!
//! Workers operate on a local scratch directory. Before a step runs, the
//! directory is restored from the job's `run/` prefix; after it finishes,
//! new files are mirrored back. This is what makes step re-execution on a
//! fresh worker resume instead of restart.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::client::StorageClient;
use crate::error::{StorageError, StorageResult};
use crate::keys;

/// Mirrors a local run directory to and from object storage.
#[derive(Clone)]
pub struct ArtifactSync {
    client: StorageClient,
}

impl ArtifactSync {
    pub fn new(client: StorageClient) -> Self {
        Self { client }
    }

    /// Upload every file under `local_dir` to `prefix`, preserving
    /// relative paths.
    pub async fn upload_directory(&self, local_dir: &Path, prefix: &str) -> StorageResult<u32> {
        let files = collect_files(local_dir).await?;
        let mut uploaded = 0u32;

        for file in &files {
            let relative = file.strip_prefix(local_dir).map_err(|_| {
                StorageError::InvalidKey(format!("{} escapes run dir", file.display()))
            })?;
            let key = format!("{}/{}", prefix.trim_end_matches('/'), to_key(relative)?);
            self.client
                .upload_file(file, &key, keys::content_type_for(file))
                .await?;
            uploaded += 1;
        }

        info!(
            "Mirrored {} files from {} to {}",
            uploaded,
            local_dir.display(),
            prefix
        );
        Ok(uploaded)
    }

    /// Download every object under `prefix` into `local_dir`, preserving
    /// relative paths. Returns the number of files restored.
    pub async fn download_prefix(&self, prefix: &str, local_dir: &Path) -> StorageResult<u32> {
        let prefix = prefix.trim_end_matches('/');
        let objects = self.client.list_objects(prefix).await?;
        let mut restored = 0u32;

        for object in &objects {
            let relative = object
                .key
                .strip_prefix(prefix)
                .map(|r| r.trim_start_matches('/'))
                .unwrap_or(&object.key);
            if relative.is_empty() {
                continue;
            }
            let target = local_dir.join(relative);
            self.client.download_file(&object.key, &target).await?;
            restored += 1;
        }

        debug!(
            "Restored {} files from {} into {}",
            restored,
            prefix,
            local_dir.display()
        );
        Ok(restored)
    }

    /// Publish final artifacts for a finished job.
    ///
    /// When the run produced an `exports/` tree, every file in it is
    /// uploaded under `jobs/final/{job_id}/` and the final-video key is
    /// the uploaded copy of `final_video`. Without an exports tree the
    /// final video alone is uploaded as `jobs/final/{job_id}-{name}`.
    /// Returns the final video key, if one was published.
    pub async fn export_final(
        &self,
        job_id: &str,
        run_dir: &Path,
        final_video: Option<&Path>,
    ) -> StorageResult<Option<String>> {
        let exports_dir = run_dir.join("exports");

        if !exports_dir.is_dir() {
            let Some(video) = final_video else {
                return Ok(None);
            };
            let filename = video
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    StorageError::InvalidKey(format!("unusable video name: {}", video.display()))
                })?;
            let key = keys::final_video_key(job_id, filename);
            self.client
                .upload_file(video, &key, keys::content_type_for(video))
                .await?;
            info!("Published final video for {} at {}", job_id, key);
            return Ok(Some(key));
        }

        let resolved_video = final_video.map(|p| p.to_path_buf());
        let mut final_video_key = None;

        for file in collect_files(&exports_dir).await? {
            let relative = file.strip_prefix(&exports_dir).map_err(|_| {
                StorageError::InvalidKey(format!("{} escapes exports dir", file.display()))
            })?;
            let key = keys::final_asset_key(job_id, &to_key(relative)?);
            self.client
                .upload_file(&file, &key, keys::content_type_for(&file))
                .await?;
            if resolved_video.as_deref() == Some(file.as_path()) {
                final_video_key = Some(key);
            }
        }

        // The final video may live outside exports/; publish it alongside
        if final_video_key.is_none() {
            if let Some(video) = final_video.filter(|p| p.exists()) {
                let filename = video
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| {
                        StorageError::InvalidKey(format!(
                            "unusable video name: {}",
                            video.display()
                        ))
                    })?;
                let key = keys::final_asset_key(job_id, filename);
                self.client
                    .upload_file(video, &key, keys::content_type_for(video))
                    .await?;
                final_video_key = Some(key);
            }
        }

        info!("Published final artifacts for {}", job_id);
        Ok(final_video_key)
    }
}

/// Collect all regular files under a directory, depth first.
async fn collect_files(root: &Path) -> StorageResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn to_key(relative: &Path) -> StorageResult<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            std::path::Component::Normal(part) => {
                parts.push(part.to_string_lossy().into_owned());
            }
            other => {
                return Err(StorageError::InvalidKey(format!(
                    "unexpected path component {:?}",
                    other
                )));
            }
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_files_walks_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        tokio::fs::create_dir_all(root.join("clips")).await.unwrap();
        tokio::fs::write(root.join("final.mp4"), b"x").await.unwrap();
        tokio::fs::write(root.join("clips/clip-1.mp4"), b"x")
            .await
            .unwrap();

        let files = collect_files(root).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.ends_with("clips/clip-1.mp4")));
    }

    #[test]
    fn test_to_key_rejects_parent_components() {
        assert!(to_key(Path::new("clips/clip-1.mp4")).is_ok());
        assert!(to_key(Path::new("../escape.mp4")).is_err());
    }
}
