//! Sora video generation client (OpenAI Video API).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info};

use newsreel_models::ClipPrompt;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{touch_placeholder, MediaProvider};

const PROVIDER: &str = "sora";

/// Sora client configuration.
#[derive(Debug, Clone)]
pub struct SoraConfig {
    pub api_key: String,
    pub model: String,
    /// Output resolution, e.g. "720x1280" for vertical video
    pub size: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub max_wait: Duration,
    pub base_url: String,
}

impl SoraConfig {
    pub fn from_env() -> ProviderResult<Self> {
        Ok(Self {
            api_key: std::env::var("SORA_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .map_err(|_| ProviderError::config_error("SORA_API_KEY not set"))?,
            model: std::env::var("SORA_MODEL").unwrap_or_else(|_| "sora-2".to_string()),
            size: std::env::var("SORA_SIZE").unwrap_or_else(|_| "720x1280".to_string()),
            poll_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_wait: Duration::from_secs(600),
            base_url: "https://api.openai.com/v1".to_string(),
        })
    }
}

/// Client for the OpenAI Video API.
pub struct SoraClient {
    config: SoraConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct VideoJob {
    id: Option<String>,
    status: Option<String>,
    error: Option<serde_json::Value>,
}

impl SoraClient {
    pub fn new(config: SoraConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(SoraConfig::from_env()?)
    }

    /// Clip durations are clamped to the provider's supported range.
    fn safe_duration(prompt: &ClipPrompt) -> u32 {
        (prompt.duration_seconds.round() as i64).clamp(3, 60) as u32
    }

    async fn create_job(&self, prompt: &ClipPrompt) -> ProviderResult<String> {
        let payload = json!({
            "model": self.config.model,
            "prompt": prompt.prompt,
            "seconds": Self::safe_duration(prompt).to_string(),
            "size": self.config.size,
        });

        let response = self
            .client
            .post(format!("{}/videos", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let job: VideoJob = response.json().await?;
        job.id.ok_or_else(|| {
            ProviderError::invalid_response(PROVIDER, "create response missing job id")
        })
    }

    async fn poll_until_complete(&self, job_id: &str) -> ProviderResult<()> {
        let started = Instant::now();

        loop {
            if started.elapsed() > self.config.max_wait {
                return Err(ProviderError::Timeout {
                    provider: PROVIDER,
                    job_id: job_id.to_string(),
                    waited_secs: self.config.max_wait.as_secs(),
                });
            }

            let response = self
                .client
                .get(format!("{}/videos/{}", self.config.base_url, job_id))
                .bearer_auth(&self.config.api_key)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(ProviderError::Api {
                    provider: PROVIDER,
                    status: status.as_u16(),
                    message,
                });
            }

            let job: VideoJob = response.json().await?;
            match job.status.as_deref() {
                Some("completed") => {
                    info!("Sora job {} completed", job_id);
                    return Ok(());
                }
                Some("failed") => {
                    let message = job
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Err(ProviderError::JobFailed {
                        provider: PROVIDER,
                        job_id: job_id.to_string(),
                        message,
                    });
                }
                other => {
                    debug!("Sora job {} status: {:?}", job_id, other);
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn download_video(&self, job_id: &str, target: &Path) -> ProviderResult<()> {
        let response = self
            .client
            .get(format!(
                "{}/videos/{}/content",
                self.config.base_url, job_id
            ))
            .query(&[("variant", "video")])
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(target, &bytes).await?;
        info!("Saved Sora video to {}", target.display());
        Ok(())
    }
}

#[async_trait]
impl MediaProvider for SoraClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn submit_prompt(
        &self,
        prompt: &ClipPrompt,
        target: &Path,
        dry_run: bool,
    ) -> ProviderResult<PathBuf> {
        if dry_run {
            info!("Sora dry run: skipping render for {}", prompt.clip_id);
            touch_placeholder(target).await?;
            return Ok(target.to_path_buf());
        }

        info!("Submitting Sora job for {}", prompt.clip_id);
        let job_id = self.create_job(prompt).await?;
        self.poll_until_complete(&job_id).await?;
        self.download_video(&job_id, target).await?;
        Ok(target.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(duration: f64) -> ClipPrompt {
        ClipPrompt {
            clip_id: "clip-1".to_string(),
            prompt: "A newsroom at dawn".to_string(),
            duration_seconds: duration,
        }
    }

    #[test]
    fn test_duration_is_clamped() {
        assert_eq!(SoraClient::safe_duration(&prompt(0.4)), 3);
        assert_eq!(SoraClient::safe_duration(&prompt(12.6)), 13);
        assert_eq!(SoraClient::safe_duration(&prompt(500.0)), 60);
    }

    #[tokio::test]
    async fn test_dry_run_touches_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("clips/clip-1.mp4");
        let client = SoraClient::new(SoraConfig {
            api_key: "test".to_string(),
            model: "sora-2".to_string(),
            size: "720x1280".to_string(),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(1),
            max_wait: Duration::from_secs(1),
            base_url: "http://localhost:1".to_string(),
        })
        .unwrap();

        let path = client
            .submit_prompt(&prompt(10.0), &target, true)
            .await
            .unwrap();
        assert!(path.exists());
        assert_eq!(tokio::fs::read(&path).await.unwrap().len(), 0);
    }
}
