//! Engine control and inventory endpoints.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use avi_intent_kit::{DatasetMetadata, EngineOutcome};
use avi_protocol::{EngineAction, Language, SlotState};

use crate::error::ApiResult;
use crate::routes::recognize::resolve_lang;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EngineParams {
    /// `train` or `reuse` (default).
    #[serde(rename = "type")]
    pub action: Option<String>,
    pub lang: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EngineResponse {
    pub result: bool,
    pub action: EngineAction,
    pub lang: Language,
    pub state: SlotState,
    /// How `reuse` obtained its model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<EngineOutcome>,
}

/// POST /intent_recognition/engine?type=train|reuse&lang=.. — train or load.
pub async fn control(
    State(state): State<AppState>,
    Query(params): Query<EngineParams>,
) -> ApiResult<Json<EngineResponse>> {
    let action = match params.action.as_deref() {
        Some(action) => action.parse()?,
        None => EngineAction::default(),
    };
    let lang = resolve_lang(&state, params.lang.as_deref()).await?;

    tracing::info!(lang = %lang, action = action.verb(), "engine control requested");
    let outcome = match action {
        EngineAction::Train => {
            state.engines.train(lang).await?;
            None
        }
        EngineAction::Reuse => Some(state.engines.reuse(lang).await?),
    };

    Ok(Json(EngineResponse {
        result: true,
        action,
        lang,
        state: state.engines.state(lang),
        outcome,
    }))
}

#[derive(Debug, Serialize)]
pub struct InstalledResponse {
    pub installed: Vec<Language>,
    pub data: BTreeMap<Language, DatasetMetadata>,
}

/// GET /intent_recognition/installed — persisted models and their metadata.
pub async fn installed(State(state): State<AppState>) -> ApiResult<Json<InstalledResponse>> {
    let engines = state.engines.installed().await?;
    Ok(Json(InstalledResponse {
        installed: engines.iter().map(|e| e.language).collect(),
        data: engines.into_iter().map(|e| (e.language, e.metadata)).collect(),
    }))
}
