//! Local classifier output, serialized in the camelCase shape downstream
//! executors already consume.

use serde::{Deserialize, Serialize};

/// Top intent guess with its probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentClassification {
    pub intent_name: String,
    pub probability: f64,
}

/// Character range `[start, end)` of a slot in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: usize,
    pub end: usize,
}

/// Resolved slot value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SlotValue {
    Custom { value: String },
}

impl SlotValue {
    pub fn custom(value: impl Into<String>) -> Self {
        SlotValue::Custom {
            value: value.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SlotValue::Custom { value } => value,
        }
    }
}

/// A named span of the input mapped to an entity value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub raw_value: String,
    pub value: SlotValue,
    pub range: SlotRange,
    pub entity: String,
    pub slot_name: String,
}

/// Result of parsing one utterance with the local classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NluResult {
    pub input: String,
    pub intent: Option<IntentClassification>,
    #[serde(default)]
    pub slots: Vec<Slot>,
}

impl NluResult {
    /// A result with no recognized intent.
    pub fn empty(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            intent: None,
            slots: Vec::new(),
        }
    }

    /// Probability of the top intent, `None` when no intent was recognized.
    pub fn confidence(&self) -> Option<f64> {
        self.intent.as_ref().map(|i| i.probability)
    }
}
