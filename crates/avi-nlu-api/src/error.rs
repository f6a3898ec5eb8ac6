//! Unified API error type with Axum `IntoResponse` support.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use avi_intent_kit::KitError;
use avi_planner::PlannerError;
use avi_protocol::ProtocolError;

use crate::dispatcher::DispatchError;

/// API error type that converts to proper HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] KitError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    Validation(String),
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Engine(e) => ApiError::Engine(e),
            DispatchError::Planner(e) => ApiError::Planner(e),
        }
    }
}

impl ApiError {
    /// HTTP status and stable machine-readable code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Engine(e) => match e {
                KitError::NotTrained(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "ENGINE_NOT_TRAINED")
                }
                KitError::WrongLanguage { .. } => {
                    (StatusCode::BAD_REQUEST, "NOT_THE_CURRENT_LANGUAGE")
                }
                KitError::DatasetFormat(_) => (StatusCode::UNPROCESSABLE_ENTITY, "DATASET_ERROR"),
                KitError::Parse(_) => (StatusCode::BAD_GATEWAY, "INTENT_ERROR"),
                KitError::DatasetNotPopulated(_) | KitError::Train(_) | KitError::Load { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "ENGINE_TRAIN_ERROR")
                }
            },
            ApiError::Planner(_) => (StatusCode::BAD_GATEWAY, "PLANNER_ERROR"),
            ApiError::Protocol(e) => match e {
                ProtocolError::DatasetFormat(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "DATASET_ERROR")
                }
                ProtocolError::InvalidPlan(_) => (StatusCode::BAD_GATEWAY, "PLANNER_ERROR"),
                ProtocolError::UnknownLanguage(_) | ProtocolError::UnknownAction(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
                }
            },
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        } else {
            tracing::debug!(code, error = %self, "request rejected");
        }

        let body = json!({
            "error": self.to_string(),
            "code": code,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience alias.
pub type ApiResult<T> = Result<T, ApiError>;
