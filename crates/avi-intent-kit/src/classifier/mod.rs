//! Intent classifier abstraction.
//!
//! The lifecycle manager only needs fit / load / persist / parse. Backends
//! implement `ClassifierBackend`; trained models implement `ClassifierModel`.
//! Every backend writes `nlu_engine.json` with a top-level
//! `dataset_metadata` object so installed models can be listed without
//! loading them.

pub mod gazetteer;
pub mod lexical;
pub mod tokenize;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use avi_protocol::NluResult;

use crate::corpus::TrainerCorpus;
use crate::error::{KitError, KitResult};

pub use lexical::{LexicalBackend, LexicalModel};

/// File every persisted model directory contains.
pub const ENGINE_FILE: &str = "nlu_engine.json";

/// Summary of the dataset a model was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub language_code: String,
    pub entities: BTreeMap<String, EntityMetadata>,
    /// intent -> slot name -> entity name
    pub slot_name_mappings: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub automatically_extensible: bool,
    /// normalized variant -> canonical value
    pub utterances: BTreeMap<String, String>,
}

impl DatasetMetadata {
    pub fn from_corpus(corpus: &TrainerCorpus) -> Self {
        let entities = corpus
            .entities
            .iter()
            .map(|(name, entity)| {
                let mut utterances = BTreeMap::new();
                for value in &entity.data {
                    utterances.insert(tokenize::normalize(&value.value), value.value.clone());
                    if entity.use_synonyms {
                        for synonym in &value.synonyms {
                            utterances.insert(tokenize::normalize(synonym), value.value.clone());
                        }
                    }
                }
                (
                    name.clone(),
                    EntityMetadata {
                        automatically_extensible: entity.automatically_extensible,
                        utterances,
                    },
                )
            })
            .collect();

        let slot_name_mappings = corpus
            .intents
            .iter()
            .map(|(name, intent)| {
                let slots = intent
                    .slots
                    .iter()
                    .map(|s| (s.name.clone(), s.entity.clone()))
                    .collect();
                (name.clone(), slots)
            })
            .collect();

        Self {
            language_code: corpus.language.code().to_string(),
            entities,
            slot_name_mappings,
        }
    }

    /// Read only the metadata section of a persisted model directory.
    pub fn read_from_dir(dir: &Path) -> KitResult<Self> {
        #[derive(Deserialize)]
        struct MetadataOnly {
            dataset_metadata: DatasetMetadata,
        }

        let path = dir.join(ENGINE_FILE);
        let load_error = |message: String| KitError::Load {
            path: path.clone(),
            message,
        };
        let contents = std::fs::read_to_string(&path).map_err(|e| load_error(e.to_string()))?;
        let parsed: MetadataOnly =
            serde_json::from_str(&contents).map_err(|e| load_error(e.to_string()))?;
        Ok(parsed.dataset_metadata)
    }
}

/// A trained, queryable model.
pub trait ClassifierModel: Send + Sync {
    /// Classify an utterance and extract its slots.
    fn parse(&self, text: &str) -> KitResult<NluResult>;

    /// Write the model into `dir` (created if missing).
    fn persist(&self, dir: &Path) -> KitResult<()>;

    fn metadata(&self) -> &DatasetMetadata;
}

/// Factory for models: trains new ones and loads persisted ones.
pub trait ClassifierBackend: Send + Sync {
    /// Fit a fresh model against a corpus, using the corpus language's
    /// default configuration. CPU-heavy; callers run it off the async
    /// executor.
    fn fit(&self, corpus: &TrainerCorpus) -> KitResult<Box<dyn ClassifierModel>>;

    /// Load a model previously written by `ClassifierModel::persist`.
    fn load(&self, dir: &Path) -> KitResult<Box<dyn ClassifierModel>>;

    fn name(&self) -> &str;
}
