//! Built-in lexical classifier.
//!
//! Two parsers run in order:
//! 1. deterministic: one anchored regex per training utterance, slot
//!    chunks as capture groups; a full match has probability 1.0
//! 2. probabilistic: TF-IDF over tokens and entity features, cosine
//!    similarity against per-intent centroids, slots from gazetteers

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use avi_protocol::{IntentClassification, Language, NluResult, Slot, SlotValue};

use super::gazetteer::{Gazetteer, GazetteerMatch, select_non_overlapping};
use super::tokenize::{Token, char_range, tokenize};
use super::{ClassifierBackend, ClassifierModel, DatasetMetadata, ENGINE_FILE};
use crate::corpus::{CorpusUtterance, TrainerCorpus};
use crate::error::{KitError, KitResult};

/// Persisted model format version. Loading rejects any other value.
pub const MODEL_VERSION: &str = "0.1.0";

/// Anything that is not a letter or digit.
const SEPARATOR: &str = r"[^\p{L}\p{N}]";

const ENGLISH_STOP_WORDS: &[&str] = &["a", "an", "the", "please", "to", "of", "me", "my"];
const PORTUGUESE_STOP_WORDS: &[&str] = &[
    "o", "a", "os", "as", "um", "uma", "de", "do", "da", "dos", "das", "por", "favor", "me",
];

/// Per-language training defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalConfig {
    pub stop_words: Vec<String>,
    /// Use `1 + ln(tf)` instead of raw term counts.
    pub sublinear_tf: bool,
    /// Softmax sharpness applied to centroid similarities.
    pub softmax_sharpness: f64,
    /// Similarities at or below this yield no intent.
    pub min_similarity: f64,
}

impl LexicalConfig {
    pub fn for_language(language: Language) -> Self {
        let stop_words = match language {
            Language::En => ENGLISH_STOP_WORDS,
            Language::Pt => PORTUGUESE_STOP_WORDS,
        };
        Self {
            stop_words: stop_words.iter().map(|w| w.to_string()).collect(),
            sublinear_tf: true,
            softmax_sharpness: 10.0,
            min_similarity: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UtterancePattern {
    intent: String,
    regex: String,
    /// Slot name for capture group `g{index}`.
    slots: Vec<String>,
}

type SparseVector = BTreeMap<usize, f64>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedModel {
    model_version: String,
    trained_at: DateTime<Utc>,
    dataset_metadata: DatasetMetadata,
    config: LexicalConfig,
    gazetteers: BTreeMap<String, Gazetteer>,
    patterns: Vec<UtterancePattern>,
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
    centroids: BTreeMap<String, Vec<(usize, f64)>>,
}

/// Backend producing `LexicalModel`s.
#[derive(Debug, Default, Clone)]
pub struct LexicalBackend;

impl LexicalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ClassifierBackend for LexicalBackend {
    fn fit(&self, corpus: &TrainerCorpus) -> KitResult<Box<dyn ClassifierModel>> {
        Ok(Box::new(LexicalModel::fit(corpus)?))
    }

    fn load(&self, dir: &Path) -> KitResult<Box<dyn ClassifierModel>> {
        Ok(Box::new(LexicalModel::from_path(dir)?))
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

/// A trained lexical model with its compiled patterns.
pub struct LexicalModel {
    data: PersistedModel,
    compiled: Vec<Regex>,
    stop_words: HashSet<String>,
}

impl LexicalModel {
    pub fn fit(corpus: &TrainerCorpus) -> KitResult<Self> {
        if corpus.intents.is_empty() {
            return Err(KitError::Train("dataset has no intents".into()));
        }

        let config = LexicalConfig::for_language(corpus.language);
        let stop_words: HashSet<String> = config.stop_words.iter().cloned().collect();

        let gazetteers: BTreeMap<String, Gazetteer> = corpus
            .entities
            .iter()
            .map(|(name, entity)| (name.clone(), Gazetteer::from_entity(name, entity)))
            .collect();

        let mut seen = HashSet::new();
        let mut patterns = Vec::new();
        for (intent_name, intent) in &corpus.intents {
            for utterance in &intent.utterances {
                if let Some((regex, slots)) = build_pattern(utterance) {
                    if seen.insert((intent_name.clone(), regex.clone())) {
                        patterns.push(UtterancePattern {
                            intent: intent_name.clone(),
                            regex,
                            slots,
                        });
                    }
                }
            }
        }
        // Most literal patterns first.
        patterns.sort_by(|a, b| a.slots.len().cmp(&b.slots.len()).then(a.intent.cmp(&b.intent)));

        let mut documents: Vec<(String, Vec<String>)> = Vec::new();
        for (intent_name, intent) in &corpus.intents {
            for utterance in &intent.utterances {
                let text = utterance.text();
                let tokens = tokenize(&text);
                let matches = all_matches(&gazetteers, &tokens);
                let mut features = text_features(&tokens, &matches, &stop_words);
                let matched: HashSet<&str> = matches.iter().map(|m| m.entity.as_str()).collect();
                for chunk in utterance.data.iter().filter(|c| c.is_slot()) {
                    if let Some(entity) = chunk.entity.as_deref() {
                        if !matched.contains(entity) {
                            features.push(entity_feature(entity));
                        }
                    }
                }
                documents.push((intent_name.clone(), features));
            }
        }

        let vocabulary: BTreeMap<String, usize> = documents
            .iter()
            .flat_map(|(_, features)| features.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .enumerate()
            .map(|(idx, feature)| (feature, idx))
            .collect();

        let mut document_frequency = vec![0usize; vocabulary.len()];
        for (_, features) in &documents {
            let unique: HashSet<usize> =
                features.iter().filter_map(|f| vocabulary.get(f)).copied().collect();
            unique.into_iter().for_each(|idx| document_frequency[idx] += 1);
        }
        let n_docs = documents.len() as f64;
        let idf: Vec<f64> = document_frequency
            .iter()
            .map(|&df| ((1.0 + n_docs) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        let mut sums: BTreeMap<String, (SparseVector, usize)> = BTreeMap::new();
        for (intent_name, features) in &documents {
            let vector = vectorize(features, &vocabulary, &idf, config.sublinear_tf);
            let entry = sums.entry(intent_name.clone()).or_default();
            for (idx, weight) in vector {
                *entry.0.entry(idx).or_default() += weight;
            }
            entry.1 += 1;
        }
        let centroids: BTreeMap<String, Vec<(usize, f64)>> = sums
            .into_iter()
            .map(|(intent_name, (sum, count))| {
                let mean: SparseVector =
                    sum.into_iter().map(|(i, w)| (i, w / count as f64)).collect();
                (intent_name, l2_normalize(mean).into_iter().collect())
            })
            .collect();

        let data = PersistedModel {
            model_version: MODEL_VERSION.to_string(),
            trained_at: Utc::now(),
            dataset_metadata: DatasetMetadata::from_corpus(corpus),
            config,
            gazetteers,
            patterns,
            vocabulary,
            idf,
            centroids,
        };

        tracing::debug!(
            lang = %corpus.language,
            intents = corpus.intents.len(),
            utterances = corpus.utterance_count(),
            patterns = data.patterns.len(),
            vocabulary = data.vocabulary.len(),
            "lexical model fitted"
        );

        Self::from_data(data).map_err(|e| KitError::Train(e.to_string()))
    }

    pub fn from_path(dir: &Path) -> KitResult<Self> {
        let path = dir.join(ENGINE_FILE);
        let load_error = |message: String| KitError::Load {
            path: path.clone(),
            message,
        };

        let contents = std::fs::read_to_string(&path).map_err(|e| load_error(e.to_string()))?;
        let data: PersistedModel =
            serde_json::from_str(&contents).map_err(|e| load_error(e.to_string()))?;
        if data.model_version != MODEL_VERSION {
            return Err(load_error(format!(
                "expected model version {MODEL_VERSION} but found {}",
                data.model_version
            )));
        }
        Self::from_data(data).map_err(|e| load_error(e.to_string()))
    }

    fn from_data(data: PersistedModel) -> Result<Self, regex::Error> {
        let compiled = data
            .patterns
            .iter()
            .map(|p| Regex::new(&p.regex))
            .collect::<Result<Vec<_>, _>>()?;
        let stop_words = data.config.stop_words.iter().cloned().collect();
        Ok(Self {
            data,
            compiled,
            stop_words,
        })
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.data.trained_at
    }

    fn parse_deterministic(&self, text: &str) -> Option<NluResult> {
        for (pattern, regex) in self.data.patterns.iter().zip(&self.compiled) {
            let Some(caps) = regex.captures(text) else {
                continue;
            };
            let slots = if pattern.slots.is_empty() {
                let tokens = tokenize(text);
                let matches = all_matches(&self.data.gazetteers, &tokens);
                self.fill_slots(text, &tokens, &pattern.intent, &matches)
            } else {
                match self.captured_slots(text, pattern, &caps) {
                    Some(slots) => slots,
                    None => continue,
                }
            };
            return Some(NluResult {
                input: text.to_string(),
                intent: Some(IntentClassification {
                    intent_name: pattern.intent.clone(),
                    probability: 1.0,
                }),
                slots,
            });
        }
        None
    }

    /// Slots from capture groups. `None` when a captured value cannot be
    /// resolved for a non-extensible entity.
    fn captured_slots(
        &self,
        text: &str,
        pattern: &UtterancePattern,
        caps: &Captures<'_>,
    ) -> Option<Vec<Slot>> {
        let mapping = self.data.dataset_metadata.slot_name_mappings.get(&pattern.intent)?;
        let mut slots = Vec::with_capacity(pattern.slots.len());
        for (idx, slot_name) in pattern.slots.iter().enumerate() {
            let m = caps.name(&format!("g{idx}"))?;
            let entity = mapping.get(slot_name)?;
            let raw = m.as_str();
            let value = match self.data.gazetteers.get(entity) {
                Some(gaz) => match gaz.resolve(raw) {
                    Some(canonical) => canonical.to_string(),
                    None if gaz.automatically_extensible => raw.to_string(),
                    None => return None,
                },
                None => raw.to_string(),
            };
            slots.push(Slot {
                raw_value: raw.to_string(),
                value: SlotValue::custom(value),
                range: char_range(text, &m.range()),
                entity: entity.clone(),
                slot_name: slot_name.clone(),
            });
        }
        Some(slots)
    }

    /// Assign gazetteer matches to the intent's slots. The k-th match of an
    /// entity fills the k-th slot bound to it, slots ordered by name.
    fn fill_slots(
        &self,
        text: &str,
        tokens: &[Token],
        intent: &str,
        matches: &[GazetteerMatch],
    ) -> Vec<Slot> {
        let Some(mapping) = self.data.dataset_metadata.slot_name_mappings.get(intent) else {
            return Vec::new();
        };

        let mut slots_by_entity: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (slot_name, entity) in mapping {
            slots_by_entity
                .entry(entity.as_str())
                .or_default()
                .push(slot_name.as_str());
        }

        let relevant = matches
            .iter()
            .filter(|m| slots_by_entity.contains_key(m.entity.as_str()))
            .cloned()
            .collect();

        let mut used: BTreeMap<&str, usize> = BTreeMap::new();
        let mut slots = Vec::new();
        for m in select_non_overlapping(relevant) {
            let Some(names) = slots_by_entity.get(m.entity.as_str()) else {
                continue;
            };
            let next = used.entry(names[0]).or_default();
            let Some(slot_name) = names.get(*next) else {
                continue;
            };
            *next += 1;

            let bytes = tokens[m.tokens.start].range.start..tokens[m.tokens.end - 1].range.end;
            slots.push(Slot {
                raw_value: text[bytes.clone()].to_string(),
                value: SlotValue::custom(m.canonical.clone()),
                range: char_range(text, &bytes),
                entity: m.entity.clone(),
                slot_name: slot_name.to_string(),
            });
        }
        slots
    }

    fn parse_probabilistic(&self, text: &str, tokens: &[Token]) -> NluResult {
        let matches = all_matches(&self.data.gazetteers, tokens);
        let features = text_features(tokens, &matches, &self.stop_words);
        let vector = vectorize(
            &features,
            &self.data.vocabulary,
            &self.data.idf,
            self.data.config.sublinear_tf,
        );

        let similarities: Vec<(&String, f64)> = self
            .data
            .centroids
            .iter()
            .map(|(intent, centroid)| {
                let dot = centroid
                    .iter()
                    .map(|(idx, w)| w * vector.get(idx).copied().unwrap_or(0.0))
                    .sum::<f64>();
                (intent, dot)
            })
            .collect();

        let Some(&(best_intent, best)) = similarities
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(a.0)))
        else {
            return NluResult::empty(text);
        };
        if best <= self.data.config.min_similarity {
            return NluResult::empty(text);
        }

        let k = self.data.config.softmax_sharpness;
        let denominator: f64 = similarities.iter().map(|(_, s)| (k * (s - best)).exp()).sum();
        let probability = (best / denominator).clamp(0.0, 1.0);

        NluResult {
            input: text.to_string(),
            intent: Some(IntentClassification {
                intent_name: best_intent.clone(),
                probability,
            }),
            slots: self.fill_slots(text, tokens, best_intent, &matches),
        }
    }
}

impl ClassifierModel for LexicalModel {
    fn parse(&self, text: &str) -> KitResult<NluResult> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Ok(NluResult::empty(text));
        }
        if let Some(result) = self.parse_deterministic(text) {
            return Ok(result);
        }
        Ok(self.parse_probabilistic(text, &tokens))
    }

    fn persist(&self, dir: &Path) -> KitResult<()> {
        let persist_error = |e: &dyn std::fmt::Display| {
            KitError::Train(format!("failed to persist model to {}: {e}", dir.display()))
        };
        std::fs::create_dir_all(dir).map_err(|e| persist_error(&e))?;
        let json = serde_json::to_string_pretty(&self.data).map_err(|e| persist_error(&e))?;
        std::fs::write(dir.join(ENGINE_FILE), json).map_err(|e| persist_error(&e))?;
        Ok(())
    }

    fn metadata(&self) -> &DatasetMetadata {
        &self.data.dataset_metadata
    }
}

/// Anchored, case-insensitive regex for an utterance. Text chunks become
/// literal tokens, slot chunks become lazy capture groups `g0`, `g1`, ...
fn build_pattern(utterance: &CorpusUtterance) -> Option<(String, Vec<String>)> {
    let mut pieces = Vec::new();
    let mut slots = Vec::new();
    for chunk in &utterance.data {
        match &chunk.slot_name {
            Some(slot_name) => {
                pieces.push(format!("(?P<g{}>.+?)", slots.len()));
                slots.push(slot_name.clone());
            }
            None => pieces.extend(tokenize(&chunk.text).into_iter().map(|t| regex::escape(&t.value))),
        }
    }
    if pieces.is_empty() {
        return None;
    }
    let sep = SEPARATOR;
    let body = pieces.join(&format!("{sep}+"));
    Some((format!("(?i)^{sep}*{body}{sep}*$"), slots))
}

fn entity_feature(entity: &str) -> String {
    format!("__entity_{entity}__")
}

fn all_matches(gazetteers: &BTreeMap<String, Gazetteer>, tokens: &[Token]) -> Vec<GazetteerMatch> {
    gazetteers
        .values()
        .flat_map(|gaz| gaz.find_matches(tokens))
        .collect()
}

fn text_features(
    tokens: &[Token],
    matches: &[GazetteerMatch],
    stop_words: &HashSet<String>,
) -> Vec<String> {
    tokens
        .iter()
        .filter(|t| !stop_words.contains(&t.value))
        .map(|t| t.value.clone())
        .chain(matches.iter().map(|m| entity_feature(&m.entity)))
        .collect()
}

fn vectorize(
    features: &[String],
    vocabulary: &BTreeMap<String, usize>,
    idf: &[f64],
    sublinear: bool,
) -> SparseVector {
    let mut counts: SparseVector = BTreeMap::new();
    for idx in features.iter().filter_map(|f| vocabulary.get(f)) {
        *counts.entry(*idx).or_default() += 1.0;
    }
    let weighted = counts
        .into_iter()
        .map(|(idx, tf)| {
            let tf = if sublinear { tf.ln() + 1.0 } else { tf };
            (idx, tf * idf[idx])
        })
        .collect();
    l2_normalize(weighted)
}

fn l2_normalize(vector: SparseVector) -> SparseVector {
    let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm == 0.0 {
        return vector;
    }
    vector.into_iter().map(|(i, w)| (i, w / norm)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::convert;
    use avi_protocol::TrainingDataset;

    fn home_corpus() -> TrainerCorpus {
        let dataset = TrainingDataset::from_json(
            r#"{
            "language": "en",
            "data": [
                {"type": "entity", "name": "room",
                 "values": [["living room", "lounge"], "kitchen", "bedroom"],
                 "automatically_extensible": false},
                {"type": "entity", "name": "color", "values": ["red", "blue", "green"]},
                {"type": "intent", "name": "lights_on",
                 "utterances": ["turn on the lights in the [room](kitchen)",
                                "switch on the [room](bedroom) lights",
                                "lights on please"],
                 "slots": [{"name": "room", "entity": "room"}]},
                {"type": "intent", "name": "set_color",
                 "utterances": ["make it [c](red)", "change the color to [c](blue)"],
                 "slots": [{"name": "c", "entity": "color"}]},
                {"type": "intent", "name": "weather",
                 "utterances": ["what is the weather like", "is it going to rain today"]}
            ]
        }"#,
        )
        .unwrap();
        convert(&dataset).unwrap()
    }

    #[test]
    fn deterministic_match_resolves_synonym() {
        let model = LexicalModel::fit(&home_corpus()).unwrap();
        let result = model.parse("Turn on the lights in the lounge").unwrap();

        let intent = result.intent.unwrap();
        assert_eq!(intent.intent_name, "lights_on");
        assert_eq!(intent.probability, 1.0);
        assert_eq!(result.slots.len(), 1);
        let slot = &result.slots[0];
        assert_eq!(slot.raw_value, "lounge");
        assert_eq!(slot.value.as_str(), "living room");
        assert_eq!(slot.slot_name, "room");
        assert_eq!(slot.range.start, 26);
        assert_eq!(slot.range.end, 32);
    }

    #[test]
    fn non_extensible_unknown_value_skips_pattern() {
        let model = LexicalModel::fit(&home_corpus()).unwrap();
        let result = model.parse("turn on the lights in the garage").unwrap();
        // Falls through to the probabilistic parser, which has no slot for "garage".
        let intent = result.intent.unwrap();
        assert_eq!(intent.intent_name, "lights_on");
        assert!(intent.probability < 1.0);
        assert!(result.slots.is_empty());
    }

    #[test]
    fn extensible_entity_keeps_raw_value() {
        let model = LexicalModel::fit(&home_corpus()).unwrap();
        let result = model.parse("make it purple").unwrap();
        assert_eq!(result.intent.as_ref().unwrap().intent_name, "set_color");
        assert_eq!(result.slots[0].value.as_str(), "purple");
        assert_eq!(result.slots[0].entity, "color");
    }

    #[test]
    fn probabilistic_match_fills_slots_from_gazetteer() {
        let model = LexicalModel::fit(&home_corpus()).unwrap();
        let result = model.parse("could you make the kitchen lights go on").unwrap();
        let intent = result.intent.unwrap();
        assert_eq!(intent.intent_name, "lights_on");
        assert!(intent.probability > 0.0 && intent.probability < 1.0);
        assert_eq!(result.slots.len(), 1);
        assert_eq!(result.slots[0].value.as_str(), "kitchen");
        assert_eq!(result.slots[0].raw_value, "kitchen");
    }

    #[test]
    fn out_of_vocabulary_input_has_no_intent() {
        let model = LexicalModel::fit(&home_corpus()).unwrap();
        let result = model.parse("zebras juggle quietly").unwrap();
        assert!(result.intent.is_none());
        assert!(result.slots.is_empty());
    }

    #[test]
    fn empty_input_has_no_intent() {
        let model = LexicalModel::fit(&home_corpus()).unwrap();
        assert!(model.parse("").unwrap().intent.is_none());
    }

    #[test]
    fn persist_and_reload_parse_identically() {
        let dir = tempfile::tempdir().unwrap();
        let model = LexicalModel::fit(&home_corpus()).unwrap();
        model.persist(dir.path()).unwrap();

        let reloaded = LexicalModel::from_path(dir.path()).unwrap();
        for text in ["make it red", "is it raining today", "could you switch the kitchen on"] {
            let before = model.parse(text).unwrap();
            let after = reloaded.parse(text).unwrap();
            assert_eq!(before.slots, after.slots);
            match (before.intent, after.intent) {
                (Some(a), Some(b)) => {
                    assert_eq!(a.intent_name, b.intent_name);
                    assert!((a.probability - b.probability).abs() < 1e-9);
                }
                (a, b) => assert_eq!(a, b),
            }
            assert_eq!(reloaded.parse(text).unwrap(), reloaded.parse(text).unwrap());
        }
        assert_eq!(reloaded.metadata(), model.metadata());
        assert_eq!(reloaded.trained_at(), model.trained_at());
    }

    #[test]
    fn wrong_model_version_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let model = LexicalModel::fit(&home_corpus()).unwrap();
        model.persist(dir.path()).unwrap();

        let path = dir.path().join(ENGINE_FILE);
        let mut json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        json["model_version"] = serde_json::json!("0.0.1");
        std::fs::write(&path, json.to_string()).unwrap();

        let err = LexicalModel::from_path(dir.path()).err().unwrap();
        assert!(err.to_string().contains("expected model version"));
    }

    #[test]
    fn metadata_lists_entities_and_slots() {
        let model = LexicalModel::fit(&home_corpus()).unwrap();
        let metadata = model.metadata();
        assert_eq!(metadata.language_code, "en");
        assert_eq!(metadata.entities["room"].utterances["lounge"], "living room");
        assert!(!metadata.entities["room"].automatically_extensible);
        assert_eq!(metadata.slot_name_mappings["set_color"]["c"], "color");
        assert!(metadata.slot_name_mappings["weather"].is_empty());
    }

    #[test]
    fn empty_corpus_fails_to_train() {
        let mut corpus = home_corpus();
        corpus.intents.clear();
        assert!(matches!(LexicalModel::fit(&corpus), Err(KitError::Train(_))));
    }

    #[test]
    fn portuguese_uses_portuguese_stop_words() {
        let config = LexicalConfig::for_language(Language::Pt);
        assert!(config.stop_words.iter().any(|w| w == "favor"));
        assert!(!config.stop_words.iter().any(|w| w == "the"));
    }
}
