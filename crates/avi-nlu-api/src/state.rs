//! Shared application state for the Axum server.

use std::sync::Arc;

use avi_intent_kit::EngineManager;
use avi_planner::{ActionPlanner, GeminiPlanner};

use crate::config::NluConfig;
use crate::dispatcher::Dispatcher;

/// Shared application state, cheap to clone into every handler.
#[derive(Clone)]
pub struct AppState {
    /// Per-language classifier slots.
    pub engines: Arc<EngineManager>,
    /// Local-first recognition with planner fallback.
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Assemble state from already-built parts (tests plug in their own
    /// backend and planner here).
    pub fn new(
        engines: Arc<EngineManager>,
        planner: Arc<dyn ActionPlanner>,
        config: &NluConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(engines.clone(), planner, config.context.clone())
            .with_confidence_threshold(config.confidence_threshold);
        Self {
            engines,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Production state: lexical classifier under `data_dir`, Gemini planner.
    pub fn from_config(config: &NluConfig) -> anyhow::Result<Self> {
        let engines = Arc::new(
            EngineManager::lexical(config.data_dir.clone(), config.language)
                .with_train_on_miss(config.train_on_miss),
        );
        let planner = Arc::new(GeminiPlanner::new(config.planner.clone())?);
        if config.planner.api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set, planner fallback will fail");
        }
        Ok(Self::new(engines, planner, config))
    }
}
