//! Intent kit error types.

use std::path::PathBuf;

use avi_protocol::{Language, ProtocolError};
use thiserror::Error;

/// Errors raised by dataset conversion and the engine lifecycle.
#[derive(Debug, Error)]
pub enum KitError {
    #[error("engine not trained for '{0}', please train or reuse it")]
    NotTrained(Language),

    #[error("dataset not populated for '{0}'")]
    DatasetNotPopulated(Language),

    #[error("wrong language dataset, expected {expected}")]
    WrongLanguage {
        expected: Language,
        found: Language,
    },

    #[error("dataset format error: {0}")]
    DatasetFormat(String),

    #[error("training failed: {0}")]
    Train(String),

    #[error("failed to load model from {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("parse failed: {0}")]
    Parse(String),
}

impl From<ProtocolError> for KitError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::DatasetFormat(msg) => KitError::DatasetFormat(msg),
            other => KitError::DatasetFormat(other.to_string()),
        }
    }
}

/// Convenience alias for intent kit results.
pub type KitResult<T> = Result<T, KitError>;
