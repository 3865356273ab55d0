//! Worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newsreel_providers::{
    ElevenLabsMusic, ElevenLabsVoice, FfmpegStitcher, GeminiScriptEngine, MediaProvider,
    MusicComposer, OpenAiVoice, SoraClient, VeoClient, VoiceSynthesizer,
};
use newsreel_queue::DispatchQueue;
use newsreel_storage::StorageClient;
use newsreel_store::FirestoreJobStore;
use newsreel_worker::{
    JobExecutor, MediaPipelineRunner, PipelineDriver, PipelineRunner, PipelineWorkflow,
    RunnerCache, WorkerConfig, WorkerError, WorkerResult,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting newsreel-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let store = match FirestoreJobStore::from_env().await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to create job store: {}", e);
            std::process::exit(1);
        }
    };

    let storage = match StorageClient::from_env().await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create storage client: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = storage.check_connectivity().await {
        error!("Storage connectivity check failed: {}", e);
        std::process::exit(1);
    }

    let queue = match DispatchQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create dispatch queue: {}", e);
            std::process::exit(1);
        }
    };

    let runners = RunnerCache::new(Box::new(build_runner));
    let workflow = Arc::new(PipelineWorkflow::new(
        store,
        storage,
        runners,
        config.clone(),
    ));
    let driver = PipelineDriver::new(workflow, config.clone());
    let executor = Arc::new(JobExecutor::new(config, queue, driver));

    let executor_clone = Arc::clone(&executor);
    let handle = tokio::spawn(async move { executor_clone.run().await });

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received shutdown signal");
        executor.shutdown();
    }

    match handle.await {
        Ok(Ok(())) => info!("Worker stopped"),
        Ok(Err(e)) => {
            error!("Executor failed: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Executor task panicked: {}", e);
            std::process::exit(1);
        }
    }
}

/// Build a pipeline runner for one pipeline-config override map. The
/// `media_provider` key selects the render backend (default "sora") and
/// `voice_provider` the narration backend (default "openai").
fn build_runner(
    config: &newsreel_models::PipelineConfig,
) -> WorkerResult<Arc<dyn PipelineRunner>> {
    let provider_name = config
        .get("media_provider")
        .and_then(|v| v.as_str())
        .unwrap_or("sora");

    let media: Arc<dyn MediaProvider> = match provider_name {
        "sora" => Arc::new(SoraClient::from_env()?),
        "veo" => Arc::new(VeoClient::from_env()?),
        other => {
            return Err(WorkerError::config_error(format!(
                "unknown media provider '{}'",
                other
            )))
        }
    };

    let voice_name = config
        .get("voice_provider")
        .and_then(|v| v.as_str())
        .unwrap_or("openai");

    let voice: Arc<dyn VoiceSynthesizer> = match voice_name {
        "openai" => Arc::new(OpenAiVoice::new()?),
        "elevenlabs" => Arc::new(ElevenLabsVoice::new()?),
        other => {
            return Err(WorkerError::config_error(format!(
                "unknown voice provider '{}'",
                other
            )))
        }
    };

    // Music is optional: jobs run without a track when the composer key
    // is absent from the environment
    let music: Option<Arc<dyn MusicComposer>> = match std::env::var("ELEVENLABS_API_KEY") {
        Ok(_) => Some(Arc::new(ElevenLabsMusic::new()?)),
        Err(_) => None,
    };

    let runner = MediaPipelineRunner::new(
        Arc::new(GeminiScriptEngine::new()?),
        media,
        voice,
        music,
        Arc::new(FfmpegStitcher::new()),
        config.clone(),
    )?;

    Ok(Arc::new(runner))
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("newsreel=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}
