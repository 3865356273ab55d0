//! ElevenLabs background music client.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::info;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{touch_placeholder, MusicComposer};

const PROVIDER: &str = "elevenlabs-music";

/// Track length accepted by the music endpoint, in milliseconds.
const MIN_LENGTH_MS: u64 = 10_000;
const MAX_LENGTH_MS: u64 = 300_000;

/// Instrumental track generation via the ElevenLabs music API.
pub struct ElevenLabsMusic {
    api_key: String,
    base_url: String,
    client: Client,
}

impl ElevenLabsMusic {
    pub fn new() -> ProviderResult<Self> {
        let api_key = std::env::var("ELEVENLABS_API_KEY")
            .map_err(|_| ProviderError::config_error("ELEVENLABS_API_KEY not set"))?;

        Ok(Self {
            api_key,
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            client: Client::new(),
        })
    }

    fn length_ms(duration_seconds: f64) -> u64 {
        ((duration_seconds.max(0.0) * 1000.0) as u64).clamp(MIN_LENGTH_MS, MAX_LENGTH_MS)
    }
}

#[async_trait]
impl MusicComposer for ElevenLabsMusic {
    async fn compose(
        &self,
        prompt: &str,
        duration_seconds: f64,
        target: &Path,
        dry_run: bool,
    ) -> ProviderResult<PathBuf> {
        if dry_run {
            info!("Music dry run: skipping track generation");
            touch_placeholder(target).await?;
            return Ok(target.to_path_buf());
        }

        let response = self
            .client
            .post(format!("{}/music", self.base_url))
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "prompt": prompt,
                "music_length_ms": Self::length_ms(duration_seconds),
            }))
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
        info!("Saved music track to {}", target.display());
        Ok(target.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_is_clamped_to_api_range() {
        assert_eq!(ElevenLabsMusic::length_ms(2.0), MIN_LENGTH_MS);
        assert_eq!(ElevenLabsMusic::length_ms(48.0), 48_000);
        assert_eq!(ElevenLabsMusic::length_ms(4000.0), MAX_LENGTH_MS);
    }
}
