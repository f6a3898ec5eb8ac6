//! Recognition dispatcher — local classifier first, remote planner fallback.
//!
//! The local parse decides the route: a classified intent at or above the
//! confidence threshold is answered by the engine; anything weaker (or no
//! intent at all) goes to the planner. An untrained slot is an error, never
//! a reason to call the planner.

use std::sync::Arc;

use avi_intent_kit::{EngineManager, KitError};
use avi_planner::{ActionPlanner, PlannerContext, PlannerError};
use avi_protocol::{Language, NluResult, RecognitionResult};

use crate::config::DEFAULT_CONFIDENCE_THRESHOLD;

/// Why a recognition failed. Classifier and planner failures stay distinct.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Engine(#[from] KitError),

    #[error(transparent)]
    Planner(#[from] PlannerError),
}

pub struct Dispatcher {
    engines: Arc<EngineManager>,
    planner: Arc<dyn ActionPlanner>,
    context: PlannerContext,
    confidence_threshold: f64,
}

impl Dispatcher {
    pub fn new(
        engines: Arc<EngineManager>,
        planner: Arc<dyn ActionPlanner>,
        context: PlannerContext,
    ) -> Self {
        Self {
            engines,
            planner,
            context,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Whether the local result is good enough to answer with. The
    /// comparison is strict: exactly the threshold stays local.
    pub fn is_conclusive(&self, result: &NluResult) -> bool {
        matches!(result.confidence(), Some(p) if p >= self.confidence_threshold)
    }

    pub async fn recognize(
        &self,
        lang: Language,
        text: &str,
    ) -> Result<RecognitionResult, DispatchError> {
        // The slot's read guard is released when `parse` returns, before
        // any planner call.
        let local = self.engines.parse(lang, text).await?;

        if self.is_conclusive(&local) {
            tracing::debug!(
                lang = %lang,
                intent = local.intent.as_ref().map(|i| i.intent_name.as_str()),
                confidence = local.confidence(),
                "recognized by engine"
            );
            return Ok(RecognitionResult::Engine(local));
        }

        tracing::info!(
            lang = %lang,
            confidence = local.confidence(),
            threshold = self.confidence_threshold,
            planner = self.planner.name(),
            "engine inconclusive, falling back to planner"
        );
        match self.planner.plan(text, &self.context).await {
            Ok(plan) => Ok(RecognitionResult::Ai(plan)),
            Err(e) => {
                tracing::warn!(lang = %lang, error = %e, "planner fallback failed");
                Err(e.into())
            }
        }
    }
}
