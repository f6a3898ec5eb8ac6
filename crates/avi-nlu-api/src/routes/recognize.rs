//! Intent recognition endpoint.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use avi_protocol::{Language, RecognitionResult};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Accepted utterance length, in characters.
pub const MIN_TEXT_CHARS: usize = 2;
pub const MAX_TEXT_CHARS: usize = 250;

#[derive(Debug, Deserialize)]
pub struct RecognizeParams {
    #[serde(default)]
    pub text: String,
    /// Defaults to the active language.
    pub lang: Option<String>,
}

/// GET /intent_recognition/?text=..&lang=.. — classify an utterance.
pub async fn recognize(
    State(state): State<AppState>,
    Query(params): Query<RecognizeParams>,
) -> ApiResult<Json<RecognitionResult>> {
    let chars = params.text.chars().count();
    if !(MIN_TEXT_CHARS..=MAX_TEXT_CHARS).contains(&chars) {
        return Err(ApiError::Validation(format!(
            "text must be between {MIN_TEXT_CHARS} and {MAX_TEXT_CHARS} characters, got {chars}"
        )));
    }

    let lang = resolve_lang(&state, params.lang.as_deref()).await?;
    let result = state.dispatcher.recognize(lang, &params.text).await?;
    Ok(Json(result))
}

/// Parse an optional `lang` query value, falling back to the active language.
pub async fn resolve_lang(state: &AppState, lang: Option<&str>) -> ApiResult<Language> {
    match lang {
        Some(code) => Ok(code.parse()?),
        None => Ok(state.engines.active_language().await),
    }
}
