//! Production wiring for the orchestrator.

use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use governor::{Quota, RateLimiter};

use crate::cms::{ContentSource, RestContentClient};
use crate::config::AppConfig;
use crate::paths::AppPaths;
use crate::services::artifacts::{ArtifactStore, FsArtifactStore};
use crate::services::model::GeminiClient;
use crate::services::orchestrator::{GenerationOrchestrator, PipelineError};
use crate::services::records::GenerationRecordStore;

pub type GenericRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters shared across pipeline stages. `model` paces outbound
/// generative calls; `items` paces between batch items.
#[derive(Default)]
pub struct Governors {
    pub model: Option<Arc<GenericRateLimiter>>,
    pub items: Option<Arc<GenericRateLimiter>>,
}

/// Wire an orchestrator from configuration and environment credentials.
///
/// Every client is constructed here and handed in explicitly; nothing is
/// initialized at module load.
pub fn build_orchestrator(config: &AppConfig) -> Result<GenerationOrchestrator, PipelineError> {
    let paths = AppPaths::new(&config.storage.path)?;

    let records = Arc::new(GenerationRecordStore::open(&paths)?);
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(
        FsArtifactStore::builder()
            .root(paths.artifacts_dir()?)
            .public_base_url(config.artifacts.public_base_url.clone())
            .build(),
    );

    let cms: Arc<dyn ContentSource> = Arc::new(RestContentClient::new(
        &config.cms.base_url,
        config.cms.api_token.clone(),
    )?);

    let model_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(
        config.generation.model_calls_per_minute,
    )));
    let items_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(
        config.generation.items_per_minute,
    )));

    let gemini = Arc::new(GeminiClient::from_env(
        config.models.text.clone(),
        config.models.image.clone(),
        Some(model_limiter.clone()),
    )?);

    Ok(GenerationOrchestrator::builder()
        .cms(cms)
        .records(records)
        .artifacts(artifacts)
        .text_model(gemini.clone())
        .image_model(gemini)
        .governors(Governors {
            model: Some(model_limiter),
            items: Some(items_limiter),
        })
        .build())
}
