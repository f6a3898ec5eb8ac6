//! Planner error types.

use avi_protocol::ProtocolError;
use thiserror::Error;

/// Errors from the remote planner. Kept apart from classifier errors so
/// callers can tell a broken local engine from an unavailable planner.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("planner API key is not configured (set GEMINI_API_KEY)")]
    MissingCredential,

    #[error("planner request failed: {0}")]
    Http(String),

    #[error("planner returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("planner did not answer within {0}s")]
    Timeout(u64),

    #[error("planner response is not a valid action plan: {0}")]
    Decode(String),

    #[error("planner returned an invalid plan: {0}")]
    InvalidPlan(String),
}

impl From<ProtocolError> for PlannerError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::InvalidPlan(msg) => PlannerError::InvalidPlan(msg),
            other => PlannerError::InvalidPlan(other.to_string()),
        }
    }
}

/// Convenience alias for planner results.
pub type PlannerResult<T> = Result<T, PlannerError>;
