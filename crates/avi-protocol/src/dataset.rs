//! Training dataset documents as posted by clients.
//!
//! A dataset is a language plus a mixed list of entity and intent
//! documents, discriminated by their `type` field.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};
use crate::language::Language;

/// A single entity value: either a bare string or a list whose first item
/// is the canonical value and the rest are synonyms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Plain(String),
    WithSynonyms(Vec<String>),
}

impl EntityValue {
    /// Canonical value, `None` for an empty synonym list.
    pub fn canonical(&self) -> Option<&str> {
        match self {
            EntityValue::Plain(value) => Some(value),
            EntityValue::WithSynonyms(values) => values.first().map(String::as_str),
        }
    }

    pub fn synonyms(&self) -> &[String] {
        match self {
            EntityValue::Plain(_) => &[],
            EntityValue::WithSynonyms(values) if values.len() > 1 => &values[1..],
            EntityValue::WithSynonyms(_) => &[],
        }
    }
}

/// A typed value set used to resolve raw text spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    pub values: Vec<EntityValue>,
    #[serde(default = "default_true")]
    pub automatically_extensible: bool,
    #[serde(default = "default_true")]
    pub use_synonyms: bool,
    /// Fraction of a value's tokens that must match, in [0, 1].
    #[serde(default = "default_strictness")]
    pub matching_strictness: f64,
}

/// Binding of a slot name to the entity that fills it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotBinding {
    pub name: String,
    pub entity: String,
}

/// An intent with its example utterances.
///
/// Utterances may annotate slots inline as `[slot](text)` or
/// `[slot:entity](text)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub name: String,
    pub utterances: Vec<String>,
    #[serde(default)]
    pub slots: Vec<SlotBinding>,
}

/// One item of a dataset's mixed document list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatasetDocument {
    Entity(EntityDefinition),
    Intent(IntentDefinition),
}

/// A language plus its entity and intent documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDataset {
    pub language: Language,
    pub data: Vec<DatasetDocument>,
}

fn default_true() -> bool {
    true
}

fn default_strictness() -> f64 {
    1.0
}

impl TrainingDataset {
    pub fn new(language: Language, data: Vec<DatasetDocument>) -> Self {
        Self { language, data }
    }

    /// Decode a dataset from JSON text.
    ///
    /// Unknown document types and missing required fields surface as
    /// `ProtocolError::DatasetFormat`.
    pub fn from_json(text: &str) -> ProtocolResult<Self> {
        serde_json::from_str(text).map_err(|e| ProtocolError::DatasetFormat(e.to_string()))
    }

    /// Decode a dataset from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> ProtocolResult<Self> {
        serde_json::from_value(value).map_err(|e| ProtocolError::DatasetFormat(e.to_string()))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDefinition> {
        self.data.iter().filter_map(|doc| match doc {
            DatasetDocument::Entity(entity) => Some(entity),
            DatasetDocument::Intent(_) => None,
        })
    }

    pub fn intents(&self) -> impl Iterator<Item = &IntentDefinition> {
        self.data.iter().filter_map(|doc| match doc {
            DatasetDocument::Intent(intent) => Some(intent),
            DatasetDocument::Entity(_) => None,
        })
    }
}
