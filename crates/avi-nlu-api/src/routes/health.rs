//! Liveness endpoints.

use axum::Json;
use axum::extract::State;
use serde_json::{Map, Value, json};

use avi_protocol::Language;

use crate::state::AppState;

/// GET / — identifies the server to Avi clients.
pub async fn root() -> Json<Value> {
    Json(json!({ "response": { "name": "Avi" } }))
}

/// GET /avi/alive — liveness plus per-language engine state.
pub async fn alive(State(state): State<AppState>) -> Json<Value> {
    let active = state.engines.active_language().await;
    let engines: Map<String, Value> = Language::ALL
        .into_iter()
        .map(|lang| (lang.code().to_string(), json!(state.engines.state(lang))))
        .collect();
    let intent_loaded = state.engines.is_loaded(active);

    Json(json!({
        "response": {
            "on": true,
            "kit": {
                "all_on": intent_loaded,
                "intent": intent_loaded,
            },
            "language": active,
            "engines": engines,
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

/// GET /health — liveness check.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
