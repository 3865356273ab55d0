//! Gemini-backed script engine.
//!
//! Turns an article into a beat-by-beat narration script, requesting
//! strict JSON output so the response parses straight into the plan.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use newsreel_models::{ArticleInfo, ScriptBeat, ScriptPlan};

use crate::error::{ProviderError, ProviderResult};
use crate::traits::ScriptEngine;

const PROVIDER: &str = "gemini";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini script engine.
pub struct GeminiScriptEngine {
    api_key: String,
    model: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// Wire shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct ScriptResponse {
    #[serde(default)]
    hook: Option<String>,
    beats: Vec<BeatResponse>,
}

#[derive(Debug, Deserialize)]
struct BeatResponse {
    narration: String,
    #[serde(default)]
    visual_direction: Option<String>,
}

impl GeminiScriptEngine {
    pub fn new() -> ProviderResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| ProviderError::config_error("GEMINI_API_KEY not set"))?;

        Ok(Self {
            api_key,
            model: std::env::var("SCRIPT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            client: Client::new(),
        })
    }

    fn build_prompt(article: &ArticleInfo, target_duration_seconds: f64) -> String {
        format!(
            "You are writing the narration for a vertical short-form news video.\n\
             Target total duration: {:.0} seconds.\n\
             Return JSON with this shape:\n\
             {{\"hook\": \"opening line\", \"beats\": [{{\"narration\": \"...\", \"visual_direction\": \"...\"}}]}}\n\
             Each beat should be one sentence of narration with a concrete visual direction.\n\n\
             Title: {}\n\nArticle:\n{}",
            target_duration_seconds, article.title, article.text
        )
    }

    fn parse_plan(text: &str) -> ProviderResult<ScriptPlan> {
        let response: ScriptResponse = serde_json::from_str(text).map_err(|e| {
            ProviderError::invalid_response(PROVIDER, format!("script JSON did not parse: {}", e))
        })?;

        if response.beats.is_empty() {
            return Err(ProviderError::invalid_response(
                PROVIDER,
                "script response had no beats",
            ));
        }

        Ok(ScriptPlan {
            hook: response.hook,
            beats: response
                .beats
                .into_iter()
                .enumerate()
                .map(|(i, beat)| ScriptBeat {
                    id: i as u32 + 1,
                    narration: beat.narration,
                    visual_direction: beat.visual_direction,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl ScriptEngine for GeminiScriptEngine {
    async fn generate_script(
        &self,
        article: &ArticleInfo,
        target_duration_seconds: f64,
    ) -> ProviderResult<ScriptPlan> {
        info!("Generating script for {}", article.slug);

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Self::build_prompt(article, target_duration_seconds),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("Gemini API error {}: {}", status, message);
            return Err(ProviderError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let body: GeminiResponse = response.json().await?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| {
                ProviderError::invalid_response(PROVIDER, "response had no candidates")
            })?;

        Self::parse_plan(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_assigns_beat_ids() {
        let text = r#"{"hook": "Breaking:", "beats": [
            {"narration": "First.", "visual_direction": "Skyline"},
            {"narration": "Second."}
        ]}"#;
        let plan = GeminiScriptEngine::parse_plan(text).unwrap();
        assert_eq!(plan.hook.as_deref(), Some("Breaking:"));
        assert_eq!(plan.beats.len(), 2);
        assert_eq!(plan.beats[0].id, 1);
        assert_eq!(plan.beats[1].id, 2);
        assert!(plan.beats[1].visual_direction.is_none());
    }

    #[test]
    fn test_parse_plan_rejects_empty_beats() {
        assert!(GeminiScriptEngine::parse_plan(r#"{"beats": []}"#).is_err());
        assert!(GeminiScriptEngine::parse_plan("not json").is_err());
    }
}
