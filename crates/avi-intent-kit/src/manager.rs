//! Engine Lifecycle Manager: one classifier slot per language.
//!
//! Each slot is guarded by its own `tokio::sync::RwLock`: `train`, `reuse`
//! and `populate` take the write side, `parse` the read side, so a parse
//! never observes a half-replaced model and two trainings of the same
//! language never interleave. Different languages never contend.
//!
//! `train` and `reuse` run on a spawned task that owns the slot's write
//! guard. A caller that gives up (a dropped HTTP request) does not release
//! the slot early; the job runs to completion and publishes its state.
//!
//! Persisted layout under the base path:
//! - `engine/<lang>/nlu_engine.json`: the trained model
//! - `dataset/dataset_<lang>.json`: the corpus it was trained on

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, watch};
use uuid::Uuid;

use avi_protocol::{Language, NluResult, SlotState, TrainingDataset};

use crate::classifier::{
    ClassifierBackend, ClassifierModel, DatasetMetadata, ENGINE_FILE, LexicalBackend,
};
use crate::corpus::{TrainerCorpus, convert};
use crate::error::{KitError, KitResult};

/// How a `reuse` call ended up loading its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineOutcome {
    /// Loaded from the persisted directory.
    Reused,
    /// Nothing was persisted, so the slot was trained.
    Trained,
}

/// A persisted model found on disk.
#[derive(Debug, Clone, Serialize)]
pub struct InstalledEngine {
    pub language: Language,
    pub metadata: DatasetMetadata,
}

#[derive(Default)]
struct SlotInner {
    model: Option<Box<dyn ClassifierModel>>,
    pending: Option<TrainerCorpus>,
}

struct LanguageSlot {
    inner: Arc<RwLock<SlotInner>>,
    /// Readable without waiting on `inner`.
    state: Arc<watch::Sender<SlotState>>,
}

impl LanguageSlot {
    fn new() -> Self {
        let (state, _) = watch::channel(SlotState::Empty);
        Self {
            inner: Arc::new(RwLock::new(SlotInner::default())),
            state: Arc::new(state),
        }
    }
}

/// Owns the classifier model of every language.
pub struct EngineManager {
    base_path: PathBuf,
    backend: Arc<dyn ClassifierBackend>,
    train_on_miss: bool,
    active: Arc<RwLock<Language>>,
    slots: HashMap<Language, LanguageSlot>,
}

impl EngineManager {
    pub fn new(
        base_path: impl Into<PathBuf>,
        backend: Arc<dyn ClassifierBackend>,
        active: Language,
    ) -> Self {
        let slots = Language::ALL
            .into_iter()
            .map(|lang| (lang, LanguageSlot::new()))
            .collect();
        Self {
            base_path: base_path.into(),
            backend,
            train_on_miss: true,
            active: Arc::new(RwLock::new(active)),
            slots,
        }
    }

    /// Manager backed by the built-in `LexicalBackend`.
    pub fn lexical(base_path: impl Into<PathBuf>, active: Language) -> Self {
        Self::new(base_path, Arc::new(LexicalBackend::new()), active)
    }

    /// Whether `reuse` trains when nothing is persisted (default: true).
    pub fn with_train_on_miss(mut self, enabled: bool) -> Self {
        self.train_on_miss = enabled;
        self
    }

    pub fn engine_dir(&self, lang: Language) -> PathBuf {
        self.base_path.join("engine").join(lang.code())
    }

    pub fn dataset_path(&self, lang: Language) -> PathBuf {
        self.base_path
            .join("dataset")
            .join(format!("dataset_{}.json", lang.code()))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Language that populate is validated against; set by the last
    /// successful `train` or `reuse`.
    pub async fn active_language(&self) -> Language {
        *self.active.read().await
    }

    pub fn state(&self, lang: Language) -> SlotState {
        *self.slot(lang).state.borrow()
    }

    pub fn is_loaded(&self, lang: Language) -> bool {
        self.state(lang) == SlotState::Loaded
    }

    fn slot(&self, lang: Language) -> &LanguageSlot {
        // Every language gets a slot in `new`.
        &self.slots[&lang]
    }

    /// Accept a dataset for the active language, converting it eagerly so
    /// malformed documents are rejected before any training.
    pub async fn populate(&self, dataset: TrainingDataset) -> KitResult<()> {
        let active = self.active_language().await;
        if dataset.language != active {
            tracing::warn!(expected = %active, found = %dataset.language, "populate rejected");
            return Err(KitError::WrongLanguage {
                expected: active,
                found: dataset.language,
            });
        }

        let corpus = convert(&dataset)?;
        tracing::info!(
            lang = %active,
            intents = corpus.intents.len(),
            entities = corpus.entities.len(),
            "dataset populated"
        );
        self.slot(active).inner.write().await.pending = Some(corpus);
        Ok(())
    }

    /// Corpus waiting to be trained for a language, if any.
    pub async fn pending_corpus(&self, lang: Language) -> Option<TrainerCorpus> {
        self.slot(lang).inner.read().await.pending.clone()
    }

    /// Fit a fresh model for `lang` and replace its persisted directory.
    pub async fn train(&self, lang: Language) -> KitResult<()> {
        self.run_exclusive(lang, JobKind::Train).await.map(|_| ())
    }

    /// Load the persisted model for `lang`, training on a miss.
    pub async fn reuse(&self, lang: Language) -> KitResult<EngineOutcome> {
        self.run_exclusive(lang, JobKind::Reuse).await
    }

    /// Classify `text` with the loaded model for `lang`.
    pub async fn parse(&self, lang: Language, text: &str) -> KitResult<NluResult> {
        let inner = self.slot(lang).inner.read().await;
        let model = inner.model.as_ref().ok_or(KitError::NotTrained(lang))?;
        let result = model.parse(text)?;
        match result.confidence() {
            Some(p) if !(0.0..=1.0).contains(&p) => Err(KitError::Parse(format!(
                "classifier returned probability {p} for '{lang}'"
            ))),
            _ => Ok(result),
        }
    }

    /// Languages with a persisted model, with their dataset metadata.
    pub async fn installed(&self) -> KitResult<Vec<InstalledEngine>> {
        let mut engines = Vec::new();
        for lang in Language::ALL {
            let _guard = self.slot(lang).inner.read().await;
            let dir = self.engine_dir(lang);
            if !persisted_model_exists(&dir).await? {
                continue;
            }
            let metadata = tokio::task::spawn_blocking(move || DatasetMetadata::read_from_dir(&dir))
                .await
                .map_err(|e| KitError::Load {
                    path: self.engine_dir(lang),
                    message: format!("metadata task failed: {e}"),
                })??;
            engines.push(InstalledEngine {
                language: lang,
                metadata,
            });
        }
        Ok(engines)
    }

    /// Take the slot's write guard and hand it to a spawned job, which
    /// releases it only when it finishes.
    async fn run_exclusive(&self, lang: Language, kind: JobKind) -> KitResult<EngineOutcome> {
        let slot = self.slot(lang);
        let guard = slot.inner.clone().write_owned().await;
        let job = SlotJob {
            lang,
            backend: self.backend.clone(),
            engine_dir: self.engine_dir(lang),
            dataset_path: self.dataset_path(lang),
            state: slot.state.clone(),
            active: self.active.clone(),
            train_on_miss: self.train_on_miss,
        };
        tokio::spawn(job.run(guard, kind))
            .await
            .map_err(|e| KitError::Train(format!("engine task for '{lang}' failed: {e}")))?
    }
}

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Train,
    Reuse,
}

/// Everything a train or reuse job needs, owned so it can outlive the
/// request that started it.
struct SlotJob {
    lang: Language,
    backend: Arc<dyn ClassifierBackend>,
    engine_dir: PathBuf,
    dataset_path: PathBuf,
    state: Arc<watch::Sender<SlotState>>,
    active: Arc<RwLock<Language>>,
    train_on_miss: bool,
}

impl SlotJob {
    async fn run(
        self,
        mut inner: OwnedRwLockWriteGuard<SlotInner>,
        kind: JobKind,
    ) -> KitResult<EngineOutcome> {
        let outcome = match kind {
            JobKind::Train => {
                self.train(&mut inner).await?;
                EngineOutcome::Trained
            }
            JobKind::Reuse => self.reuse(&mut inner).await?,
        };
        drop(inner);
        *self.active.write().await = self.lang;
        Ok(outcome)
    }

    async fn reuse(&self, inner: &mut SlotInner) -> KitResult<EngineOutcome> {
        let lang = self.lang;
        let dir = self.engine_dir.clone();

        if persisted_model_exists(&dir).await? {
            let backend = self.backend.clone();
            let load_dir = dir.clone();
            let model = tokio::task::spawn_blocking(move || backend.load(&load_dir))
                .await
                .map_err(|e| KitError::Load {
                    path: dir.clone(),
                    message: format!("load task failed: {e}"),
                })??;
            inner.model = Some(model);
            self.state.send_replace(SlotState::Loaded);
            tracing::info!(lang = %lang, dir = %dir.display(), "engine reused");
            Ok(EngineOutcome::Reused)
        } else if self.train_on_miss {
            tracing::info!(lang = %lang, "no persisted engine, training");
            self.train(inner).await?;
            Ok(EngineOutcome::Trained)
        } else {
            Err(KitError::NotTrained(lang))
        }
    }

    async fn train(&self, inner: &mut SlotInner) -> KitResult<()> {
        let lang = self.lang;
        let corpus = match inner.pending.clone() {
            Some(corpus) => corpus,
            None => self
                .read_saved_corpus()
                .await?
                .ok_or(KitError::DatasetNotPopulated(lang))?,
        };

        let marker = TrainingMarker::begin(&self.state, inner.model.is_some());
        tracing::info!(
            lang = %lang,
            backend = self.backend.name(),
            intents = corpus.intents.len(),
            utterances = corpus.utterance_count(),
            "training engine"
        );

        let backend = self.backend.clone();
        let engine_dir = self.engine_dir.clone();
        let dataset_path = self.dataset_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            fit_and_persist(backend.as_ref(), &corpus, &engine_dir, &dataset_path)
        })
        .await
        .map_err(|e| KitError::Train(format!("training task failed: {e}")))
        .and_then(|r| r);

        match result {
            Ok(model) => {
                inner.model = Some(model);
                marker.finish(SlotState::Loaded);
                tracing::info!(lang = %lang, "training finished, engine ready");
                Ok(())
            }
            Err(e) => {
                drop(marker);
                tracing::error!(lang = %lang, error = %e, "training failed");
                Err(e)
            }
        }
    }

    async fn read_saved_corpus(&self) -> KitResult<Option<TrainerCorpus>> {
        let path = &self.dataset_path;
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let corpus: TrainerCorpus = serde_json::from_str(&contents).map_err(|e| {
                    KitError::DatasetFormat(format!("{}: {e}", path.display()))
                })?;
                tracing::info!(lang = %self.lang, path = %path.display(), "using saved dataset");
                Ok(Some(corpus))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KitError::DatasetFormat(format!("{}: {e}", path.display()))),
        }
    }
}

/// Publishes `Training` while alive. Unless `finish` sets the final state,
/// dropping it restores `Loaded` or `Empty` depending on whether a model
/// was loaded before.
struct TrainingMarker<'a> {
    state: &'a watch::Sender<SlotState>,
    fallback: SlotState,
    finished: bool,
}

impl<'a> TrainingMarker<'a> {
    fn begin(state: &'a watch::Sender<SlotState>, had_model: bool) -> Self {
        state.send_replace(SlotState::Training);
        Self {
            state,
            fallback: if had_model {
                SlotState::Loaded
            } else {
                SlotState::Empty
            },
            finished: false,
        }
    }

    fn finish(mut self, state: SlotState) {
        self.state.send_replace(state);
        self.finished = true;
    }
}

impl Drop for TrainingMarker<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.send_replace(self.fallback);
        }
    }
}

/// Whether `dir` holds a persisted model. I/O failures other than a
/// missing file are load errors, not a miss.
async fn persisted_model_exists(dir: &Path) -> KitResult<bool> {
    let path = dir.join(ENGINE_FILE);
    tokio::fs::try_exists(&path)
        .await
        .map_err(|e| KitError::Load {
            path,
            message: e.to_string(),
        })
}

fn fit_and_persist(
    backend: &dyn ClassifierBackend,
    corpus: &TrainerCorpus,
    engine_dir: &Path,
    dataset_path: &Path,
) -> KitResult<Box<dyn ClassifierModel>> {
    let model = backend.fit(corpus)?;
    save_corpus(corpus, dataset_path)?;
    replace_model_dir(model.as_ref(), engine_dir)?;
    Ok(model)
}

fn save_corpus(corpus: &TrainerCorpus, path: &Path) -> KitResult<()> {
    let io_error =
        |e: &dyn std::fmt::Display| KitError::Train(format!("writing {}: {e}", path.display()));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_error(&e))?;
    }
    let json = serde_json::to_string_pretty(corpus).map_err(|e| io_error(&e))?;
    std::fs::write(path, json).map_err(|e| io_error(&e))
}

/// Persist into a staging directory, then remove the old directory and
/// move the staging one into place. A crash between the remove and the
/// rename leaves the slot without a persisted model; it must be retrained.
fn replace_model_dir(model: &dyn ClassifierModel, target: &Path) -> KitResult<()> {
    let io_error =
        |e: &dyn std::fmt::Display| KitError::Train(format!("replacing {}: {e}", target.display()));
    let parent = target
        .parent()
        .ok_or_else(|| KitError::Train(format!("{} has no parent", target.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| io_error(&e))?;

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = parent.join(format!(".{name}.staging-{}", Uuid::now_v7()));

    if let Err(e) = model.persist(&staging) {
        match std::fs::remove_dir_all(&staging) {
            Ok(()) => {}
            Err(cleanup) if cleanup.kind() == std::io::ErrorKind::NotFound => {}
            Err(cleanup) => tracing::warn!(
                dir = %staging.display(),
                error = %cleanup,
                "failed to remove staging directory"
            ),
        }
        return Err(e);
    }
    if target.exists() {
        tracing::debug!(dir = %target.display(), "removing existing engine directory");
        std::fs::remove_dir_all(target).map_err(|e| io_error(&e))?;
    }
    std::fs::rename(&staging, target).map_err(|e| io_error(&e))?;
    tracing::debug!(dir = %target.display(), "engine persisted");
    Ok(())
}
