//! External media collaborators.
//!
//! This crate provides:
//! - The [`MediaProvider`] contract for per-clip video generation, with
//!   Sora and Veo HTTP clients (bounded polling)
//! - The [`ScriptEngine`] contract with a Gemini-backed implementation
//! - The [`VoiceSynthesizer`] contract with OpenAI and ElevenLabs clients
//! - The [`MusicComposer`] contract with an ElevenLabs client
//! - ASS caption rendering for burned-in subtitles
//! - The [`Stitcher`] contract with an ffmpeg implementation

pub mod captions;
pub mod error;
pub mod music;
pub mod script;
pub mod sora;
pub mod stitch;
pub mod traits;
pub mod veo;
pub mod voice;

pub use captions::CaptionCue;
pub use error::{ProviderError, ProviderResult};
pub use music::ElevenLabsMusic;
pub use script::GeminiScriptEngine;
pub use sora::{SoraClient, SoraConfig};
pub use stitch::FfmpegStitcher;
pub use traits::{
    MediaProvider, MusicComposer, Narration, ScriptEngine, Stitcher, VoiceSynthesizer,
};
pub use veo::{VeoClient, VeoConfig};
pub use voice::{ElevenLabsVoice, OpenAiVoice};
