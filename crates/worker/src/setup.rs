//! Wiring of concrete collaborators into a [`VideoPipeline`].

use std::sync::Arc;
use std::time::Duration;

use storyreel_core::generation::GenerationKind;
use storyreel_db::{DbPool, PgProjectStore};
use storyreel_events::EventBus;
use storyreel_pipeline::clock::TokioClock;
use storyreel_pipeline::{FfmpegEngine, PipelineDeps, VideoPipeline};
use storyreel_providers::{HttpGenerationProvider, HttpSpeechProvider, ProviderRegistry, S3Storage};

use crate::config::WorkerConfig;

/// Per-request timeout for provider HTTP calls. Result downloads can be
/// large, so this is generous.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Register the configured video models and, if set, the music model.
pub fn build_registry(config: &WorkerConfig, http: &reqwest::Client) -> ProviderRegistry {
    let video = Arc::new(HttpGenerationProvider::new(
        http.clone(),
        &config.generation_api_url,
        &config.generation_api_key,
        GenerationKind::Video,
    ));

    let mut registry = ProviderRegistry::new();
    for model in &config.generation_models {
        registry.register(model.as_str(), video.clone());
    }

    if let Some(model) = &config.music_model {
        let music = HttpGenerationProvider::new(
            http.clone(),
            &config.generation_api_url,
            &config.generation_api_key,
            GenerationKind::Music,
        );
        registry.register(model.as_str(), Arc::new(music));
    }

    registry
}

pub async fn build_pipeline(
    config: &WorkerConfig,
    pool: DbPool,
    events: Arc<EventBus>,
) -> Result<VideoPipeline, reqwest::Error> {
    let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

    let registry = build_registry(config, &http);
    tracing::info!(models = ?registry.models(), "Generation models registered");

    let speech = HttpSpeechProvider::new(
        http,
        &config.tts_api_url,
        &config.tts_api_key,
        &config.tts_model,
    );
    let storage = S3Storage::connect(config.storage.clone()).await;

    let deps = PipelineDeps {
        store: Arc::new(PgProjectStore::new(pool)),
        storage: Arc::new(storage),
        registry,
        speech: Arc::new(speech),
        media: Arc::new(FfmpegEngine::new(config.media_config())),
        events,
        clock: Arc::new(TokioClock),
    };
    Ok(VideoPipeline::new(deps, config.pipeline_config()))
}
