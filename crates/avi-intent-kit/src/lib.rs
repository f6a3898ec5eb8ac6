//! Intent classifier lifecycle for the Avi NLU server.
//!
//! - `corpus`: converts client datasets into the trainer corpus form
//! - `classifier`: `ClassifierBackend`/`ClassifierModel` traits plus the
//!   built-in `LexicalBackend`
//! - `manager`: `EngineManager`, one lock-guarded model slot per language

pub mod classifier;
pub mod corpus;
pub mod error;
pub mod manager;

pub use classifier::{ClassifierBackend, ClassifierModel, DatasetMetadata, LexicalBackend};
pub use corpus::{TrainerCorpus, convert};
pub use error::{KitError, KitResult};
pub use manager::{EngineManager, EngineOutcome, InstalledEngine};
