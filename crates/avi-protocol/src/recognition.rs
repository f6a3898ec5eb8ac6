//! Normalized recognition output.

use serde::{Deserialize, Serialize};

use crate::nlu::NluResult;
use crate::plan::ActionPlan;

/// Which path produced a recognition result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Processor {
    /// Local intent classifier.
    Engine,
    /// Remote generative planner.
    Ai,
}

/// Either a local classification or a remote action plan, tagged with the
/// processor that produced it.
///
/// Serializes as `{"processor": "engine" | "ai", "result": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "processor", content = "result", rename_all = "lowercase")]
pub enum RecognitionResult {
    Engine(NluResult),
    Ai(ActionPlan),
}

impl RecognitionResult {
    pub fn processor(&self) -> Processor {
        match self {
            RecognitionResult::Engine(_) => Processor::Engine,
            RecognitionResult::Ai(_) => Processor::Ai,
        }
    }
}
