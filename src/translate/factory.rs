use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use super::indictrans::IndicTransEngine;
use super::interface::Translator;
use crate::config::Config;
use crate::hub;

/// Builds the process-wide translator from configuration.
pub struct TranslatorFactory;

impl TranslatorFactory {
    /// Resolves the checkpoint (local or hub) and loads it.
    ///
    /// Runs once at startup; the returned translator is shared by all requests.
    pub async fn create(config: &Config) -> Result<Arc<dyn Translator>> {
        info!("Loading IndicTrans2 model ({})", config.model.repo_id);

        let dir = hub::resolve_model_dir(&config.model)
            .await
            .context("Failed to locate model files")?;

        let model = config.model.clone();
        let generation = config.generation.clone();
        let engine = tokio::task::spawn_blocking(move || {
            IndicTransEngine::load(&dir, &model, generation)
        })
        .await
        .context("Model loading task panicked")?
        .context("Failed to load model")?;

        Ok(Arc::new(engine))
    }
}
