//! Dataset populate endpoint.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};

use avi_protocol::{ProtocolError, TrainingDataset};

use crate::error::ApiResult;
use crate::state::AppState;

/// POST /intent_recognition/populate — stage a dataset for the active language.
///
/// The body is decoded here rather than through the `Json` extractor so a
/// malformed document gets the same `DATASET_ERROR` response as a
/// structurally invalid one.
pub async fn populate(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let text = std::str::from_utf8(&body)
        .map_err(|e| ProtocolError::DatasetFormat(format!("body is not UTF-8: {e}")))?;
    let dataset = TrainingDataset::from_json(text)?;
    state.engines.populate(dataset).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "created": true }))))
}
