//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while decoding or validating shared wire types.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("dataset format error: {0}")]
    DatasetFormat(String),

    #[error("invalid action plan: {0}")]
    InvalidPlan(String),

    #[error("unknown language '{0}'")]
    UnknownLanguage(String),

    #[error("unknown engine action '{0}', expected 'train' or 'reuse'")]
    UnknownAction(String),
}

/// Convenience alias for protocol results.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
