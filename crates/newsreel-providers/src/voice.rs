//! Narration synthesis clients.
//!
//! Two backends: OpenAI speech (audio only) and ElevenLabs
//! (audio plus character-level timing, which downstream caption
//! rendering can use).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{touch_placeholder, Narration, VoiceSynthesizer};

const PROVIDER: &str = "openai-tts";
const ELEVENLABS: &str = "elevenlabs-tts";

/// Narration synthesis via the OpenAI speech API.
pub struct OpenAiVoice {
    api_key: String,
    model: String,
    voice: String,
    client: Client,
}

impl OpenAiVoice {
    pub fn new() -> ProviderResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::config_error("OPENAI_API_KEY not set"))?;

        Ok(Self {
            api_key,
            model: std::env::var("TTS_MODEL").unwrap_or_else(|_| "gpt-4o-mini-tts".to_string()),
            voice: std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string()),
            client: Client::new(),
        })
    }
}

#[async_trait]
impl VoiceSynthesizer for OpenAiVoice {
    async fn synthesize(
        &self,
        text: &str,
        target: &Path,
        dry_run: bool,
    ) -> ProviderResult<Narration> {
        if dry_run {
            info!("TTS dry run: skipping narration synthesis");
            touch_placeholder(target).await?;
            return Ok(Narration {
                audio: target.to_path_buf(),
                alignment: None,
            });
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "voice": self.voice,
                "input": text,
                "response_format": "mp3",
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
        info!("Saved narration to {}", target.display());
        Ok(Narration {
            audio: target.to_path_buf(),
            // The speech endpoint returns audio only
            alignment: None,
        })
    }
}

/// Narration synthesis via the ElevenLabs with-timestamps endpoint, which
/// returns the audio inline alongside character-level timing.
pub struct ElevenLabsVoice {
    api_key: String,
    voice_id: String,
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TimestampedSpeech {
    audio_base64: String,
    #[serde(default)]
    alignment: Option<serde_json::Value>,
}

impl ElevenLabsVoice {
    pub fn new() -> ProviderResult<Self> {
        let api_key = std::env::var("ELEVENLABS_API_KEY")
            .map_err(|_| ProviderError::config_error("ELEVENLABS_API_KEY not set"))?;

        Ok(Self {
            api_key,
            voice_id: std::env::var("ELEVENLABS_VOICE_ID")
                .unwrap_or_else(|_| "21m00Tcm4TlvDq8ikWAM".to_string()),
            model: std::env::var("ELEVENLABS_TTS_MODEL")
                .unwrap_or_else(|_| "eleven_multilingual_v2".to_string()),
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            client: Client::new(),
        })
    }

    /// The alignment payload lives next to the audio file.
    pub fn alignment_path(target: &Path) -> PathBuf {
        target.with_extension("alignment.json")
    }
}

#[async_trait]
impl VoiceSynthesizer for ElevenLabsVoice {
    async fn synthesize(
        &self,
        text: &str,
        target: &Path,
        dry_run: bool,
    ) -> ProviderResult<Narration> {
        if dry_run {
            info!("TTS dry run: skipping narration synthesis");
            touch_placeholder(target).await?;
            return Ok(Narration {
                audio: target.to_path_buf(),
                alignment: None,
            });
        }

        let response = self
            .client
            .post(format!(
                "{}/text-to-speech/{}/with-timestamps",
                self.base_url, self.voice_id
            ))
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "text": text,
                "model_id": self.model,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                provider: ELEVENLABS,
                status: status.as_u16(),
                message,
            });
        }

        let speech: TimestampedSpeech = response.json().await?;
        let audio = base64::engine::general_purpose::STANDARD
            .decode(&speech.audio_base64)
            .map_err(|e| {
                ProviderError::invalid_response(ELEVENLABS, format!("bad audio payload: {}", e))
            })?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(target, &audio).await?;

        let alignment = match speech.alignment {
            Some(payload) => {
                let path = Self::alignment_path(target);
                tokio::fs::write(&path, serde_json::to_vec(&payload)?).await?;
                Some(path)
            }
            None => None,
        };

        info!("Saved narration to {}", target.display());
        Ok(Narration {
            audio: target.to_path_buf(),
            alignment,
        })
    }
}
