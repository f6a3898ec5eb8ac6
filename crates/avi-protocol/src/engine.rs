//! Engine lifecycle vocabulary shared between the kit and the HTTP layer.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Training control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineAction {
    Train,
    /// Load the persisted model, training it first if none exists.
    #[default]
    Reuse,
}

impl EngineAction {
    /// Present participle used in error messages ("Error training the engine").
    pub fn verb(&self) -> &'static str {
        match self {
            EngineAction::Train => "training",
            EngineAction::Reuse => "reusing",
        }
    }
}

impl FromStr for EngineAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(EngineAction::Train),
            "reuse" => Ok(EngineAction::Reuse),
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }
}

/// Lifecycle state of one language slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    #[default]
    Empty,
    Training,
    Loaded,
}
