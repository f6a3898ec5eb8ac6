//! Dataset Converter — client dataset documents to trainer corpus.
//!
//! The corpus is the declarative form the classifier trainer consumes:
//! entities keyed by name with their values and matching flags, intents
//! keyed by name with utterances split into text and slot chunks.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use avi_protocol::{
    DatasetDocument, EntityDefinition, IntentDefinition, Language, SlotBinding, TrainingDataset,
};

use crate::error::{KitError, KitResult};

/// Prefix of builtin entity names resolved by the trainer itself.
pub const BUILTIN_ENTITY_PREFIX: &str = "snips/";

/// `[slot](text)` or `[slot:entity](text)`.
static SLOT_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\[\]:]+)(?::([^\[\]]+))?\]\(([^()]+)\)").expect("valid annotation regex")
});

/// Trainer input for one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerCorpus {
    pub language: Language,
    pub locale: String,
    pub entities: BTreeMap<String, CorpusEntity>,
    pub intents: BTreeMap<String, CorpusIntent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntity {
    pub data: Vec<CorpusEntityValue>,
    pub automatically_extensible: bool,
    pub use_synonyms: bool,
    pub matching_strictness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntityValue {
    pub value: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusIntent {
    pub slots: Vec<SlotBinding>,
    pub utterances: Vec<CorpusUtterance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusUtterance {
    pub data: Vec<UtteranceChunk>,
}

/// A piece of an utterance. Slot chunks carry both the slot and entity name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtteranceChunk {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl UtteranceChunk {
    fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            slot_name: None,
            entity: None,
        }
    }

    pub fn is_slot(&self) -> bool {
        self.slot_name.is_some()
    }
}

impl CorpusUtterance {
    /// Plain text with annotations removed.
    pub fn text(&self) -> String {
        self.data.iter().map(|c| c.text.as_str()).collect()
    }
}

impl CorpusIntent {
    pub fn entity_for_slot(&self, slot_name: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|s| s.name == slot_name)
            .map(|s| s.entity.as_str())
    }
}

impl TrainerCorpus {
    pub fn utterance_count(&self) -> usize {
        self.intents.values().map(|i| i.utterances.len()).sum()
    }
}

/// Convert a dataset into the trainer corpus.
///
/// Pure structural transform. Fails with `KitError::DatasetFormat` on empty
/// names or utterances, duplicate names, out-of-range strictness, unbound
/// annotated slots, or slot bindings naming an undeclared entity.
pub fn convert(dataset: &TrainingDataset) -> KitResult<TrainerCorpus> {
    let mut entities = BTreeMap::new();
    let mut intent_defs = Vec::new();

    for doc in &dataset.data {
        match doc {
            DatasetDocument::Entity(def) => {
                let entity = convert_entity(def)?;
                if entities.insert(def.name.clone(), entity).is_some() {
                    return Err(format_error(format!("duplicate entity '{}'", def.name)));
                }
            }
            DatasetDocument::Intent(def) => intent_defs.push(def),
        }
    }

    let mut intents = BTreeMap::new();
    for def in intent_defs {
        let intent = convert_intent(def, &entities)?;
        if intents.insert(def.name.clone(), intent).is_some() {
            return Err(format_error(format!("duplicate intent '{}'", def.name)));
        }
    }

    Ok(TrainerCorpus {
        language: dataset.language,
        locale: dataset.language.locale().to_string(),
        entities,
        intents,
    })
}

fn format_error(msg: String) -> KitError {
    KitError::DatasetFormat(msg)
}

fn convert_entity(def: &EntityDefinition) -> KitResult<CorpusEntity> {
    if def.name.trim().is_empty() {
        return Err(format_error("entity with empty name".into()));
    }
    if def.values.is_empty() {
        return Err(format_error(format!("entity '{}' has no values", def.name)));
    }
    if !(0.0..=1.0).contains(&def.matching_strictness) {
        return Err(format_error(format!(
            "entity '{}' matching_strictness {} is outside [0, 1]",
            def.name, def.matching_strictness
        )));
    }

    let data = def
        .values
        .iter()
        .map(|value| {
            let canonical = value
                .canonical()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| format_error(format!("entity '{}' has an empty value", def.name)))?;
            Ok(CorpusEntityValue {
                value: canonical.to_string(),
                synonyms: value.synonyms().to_vec(),
            })
        })
        .collect::<KitResult<Vec<_>>>()?;

    Ok(CorpusEntity {
        data,
        automatically_extensible: def.automatically_extensible,
        use_synonyms: def.use_synonyms,
        matching_strictness: def.matching_strictness,
    })
}

fn convert_intent(
    def: &IntentDefinition,
    entities: &BTreeMap<String, CorpusEntity>,
) -> KitResult<CorpusIntent> {
    if def.name.trim().is_empty() {
        return Err(format_error("intent with empty name".into()));
    }
    if def.utterances.is_empty() {
        return Err(format_error(format!("intent '{}' has no utterances", def.name)));
    }

    let mut slots = def.slots.clone();
    let mut utterances = Vec::with_capacity(def.utterances.len());
    for raw in &def.utterances {
        if raw.trim().is_empty() {
            return Err(format_error(format!("intent '{}' has an empty utterance", def.name)));
        }
        utterances.push(parse_utterance(&def.name, raw, &mut slots)?);
    }

    for slot in &slots {
        let known = entities.contains_key(&slot.entity)
            || slot.entity.starts_with(BUILTIN_ENTITY_PREFIX);
        if !known {
            return Err(format_error(format!(
                "intent '{}' slot '{}' references unknown entity '{}'",
                def.name, slot.name, slot.entity
            )));
        }
    }

    Ok(CorpusIntent { slots, utterances })
}

/// Split an annotated utterance into chunks, registering slots declared
/// inline as `[slot:entity](text)`.
fn parse_utterance(
    intent: &str,
    raw: &str,
    slots: &mut Vec<SlotBinding>,
) -> KitResult<CorpusUtterance> {
    let mut data = Vec::new();
    let mut cursor = 0;

    for caps in SLOT_ANNOTATION.captures_iter(raw) {
        let (Some(whole), Some(slot_name), Some(text)) = (caps.get(0), caps.get(1), caps.get(3))
        else {
            continue;
        };
        if whole.start() > cursor {
            data.push(UtteranceChunk::text(&raw[cursor..whole.start()]));
        }
        cursor = whole.end();

        let slot_name = slot_name.as_str().trim();
        let bound = slots
            .iter()
            .find(|s| s.name == slot_name)
            .map(|s| s.entity.clone());
        let entity = match (caps.get(2).map(|m| m.as_str().trim()), bound) {
            (Some(explicit), Some(bound)) if explicit != bound => {
                return Err(format_error(format!(
                    "intent '{intent}' slot '{slot_name}' annotated with entity '{explicit}' but bound to '{bound}'"
                )));
            }
            (_, Some(bound)) => bound,
            (Some(explicit), None) => {
                slots.push(SlotBinding {
                    name: slot_name.to_string(),
                    entity: explicit.to_string(),
                });
                explicit.to_string()
            }
            (None, None) => {
                return Err(format_error(format!(
                    "intent '{intent}' utterance uses unbound slot '{slot_name}'"
                )));
            }
        };

        data.push(UtteranceChunk {
            text: text.as_str().to_string(),
            slot_name: Some(slot_name.to_string()),
            entity: Some(entity),
        });
    }

    if cursor < raw.len() {
        data.push(UtteranceChunk::text(&raw[cursor..]));
    }

    Ok(CorpusUtterance { data })
}
