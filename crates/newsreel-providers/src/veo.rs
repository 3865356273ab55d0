//! Veo video generation client (Gemini API long-running operations).

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

const PROVIDER: &str = "veo";

/// Veo client configuration.
#[derive(Debug, Clone)]
pub struct VeoConfig {
    pub api_key: String,
    pub model: String,
    /// "9:16" for vertical video
    pub aspect_ratio: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub max_wait: Duration,
    pub base_url: String,
}

impl VeoConfig {
    pub fn from_env() -> ProviderResult<Self> {
        Ok(Self {
            api_key: std::env::var("VEO_API_KEY")
                .or_else(|_| std::env::var("GEMINI_API_KEY"))
                .map_err(|_| ProviderError::config_error("VEO_API_KEY not set"))?,
            model: std::env::var("VEO_MODEL")
                .unwrap_or_else(|_| "veo-3.0-generate-001".to_string()),
            aspect_ratio: std::env::var("VEO_ASPECT_RATIO").unwrap_or_else(|_| "9:16".to_string()),
            poll_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_wait: Duration::from_secs(600),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        })
    }
}

/// Client for the Gemini API's Veo long-running video generation.
pub struct VeoClient {
    config: VeoConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    name: Option<String>,
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    response: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    message: Option<String>,
}

impl VeoClient {
    pub fn new(config: VeoConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> ProviderResult<Self> {
        Self::new(VeoConfig::from_env()?)
    }

    async fn start_operation(&self, prompt: &ClipPrompt) -> ProviderResult<String> {
        let payload = json!({
            "instances": [{ "prompt": prompt.prompt }],
            "parameters": { "aspectRatio": self.config.aspect_ratio },
        });

        let response = self
            .client
            .post(format!(
                "{}/models/{}:predictLongRunning",
                self.config.base_url, self.config.model
            ))
            .header("x-goog-api-key", &self.config.api_key)
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

        let operation: Operation = response.json().await?;
        operation.name.ok_or_else(|| {
            ProviderError::invalid_response(PROVIDER, "operation response missing name")
        })
    }

    async fn poll_operation(&self, name: &str) -> ProviderResult<serde_json::Value> {
        let started = Instant::now();

        loop {
            if started.elapsed() > self.config.max_wait {
                return Err(ProviderError::Timeout {
                    provider: PROVIDER,
                    job_id: name.to_string(),
                    waited_secs: self.config.max_wait.as_secs(),
                });
            }

            let response = self
                .client
                .get(format!("{}/{}", self.config.base_url, name))
                .header("x-goog-api-key", &self.config.api_key)
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

            let operation: Operation = response.json().await?;
            if operation.done {
                if let Some(error) = operation.error {
                    return Err(ProviderError::JobFailed {
                        provider: PROVIDER,
                        job_id: name.to_string(),
                        message: error.message.unwrap_or_else(|| "unknown error".to_string()),
                    });
                }
                info!("Veo operation {} completed", name);
                return operation.response.ok_or_else(|| {
                    ProviderError::invalid_response(PROVIDER, "done operation missing response")
                });
            }

            debug!("Veo operation {} still running", name);
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn video_uri(response: &serde_json::Value) -> ProviderResult<String> {
        response
            .pointer("/generateVideoResponse/generatedSamples/0/video/uri")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ProviderError::invalid_response(PROVIDER, "response missing generated video uri")
            })
    }

    async fn download_video(&self, uri: &str, target: &Path) -> ProviderResult<()> {
        let response = self
            .client
            .get(uri)
            .header("x-goog-api-key", &self.config.api_key)
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
        info!("Saved Veo video to {}", target.display());
        Ok(())
    }
}

#[async_trait]
impl MediaProvider for VeoClient {
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
            info!("Veo dry run: skipping render for {}", prompt.clip_id);
            touch_placeholder(target).await?;
            return Ok(target.to_path_buf());
        }

        info!("Submitting Veo operation for {}", prompt.clip_id);
        let name = self.start_operation(prompt).await?;
        let response = self.poll_operation(&name).await?;
        let uri = Self::video_uri(&response)?;
        self.download_video(&uri, target).await?;
        Ok(target.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_uri_extraction() {
        let response = json!({
            "generateVideoResponse": {
                "generatedSamples": [
                    { "video": { "uri": "https://example.com/video.mp4" } }
                ]
            }
        });
        assert_eq!(
            VeoClient::video_uri(&response).unwrap(),
            "https://example.com/video.mp4"
        );

        let empty = json!({ "generateVideoResponse": { "generatedSamples": [] } });
        assert!(VeoClient::video_uri(&empty).is_err());
    }
}
