//! API route definitions and router builder.

pub mod engine;
pub mod health;
pub mod populate;
pub mod recognize;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/avi/alive", get(health::alive))
        // Intent recognition; both spellings of the collection root
        .route("/intent_recognition", get(recognize::recognize))
        .route("/intent_recognition/", get(recognize::recognize))
        .route("/intent_recognition/engine", post(engine::control))
        .route("/intent_recognition/populate", post(populate::populate))
        .route("/intent_recognition/installed", get(engine::installed))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
