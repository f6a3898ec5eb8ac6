pub mod dataset;
pub mod engine;
pub mod error;
pub mod language;
pub mod nlu;
pub mod plan;
pub mod recognition;

pub use dataset::*;
pub use engine::*;
pub use error::{ProtocolError, ProtocolResult};
pub use language::*;
pub use nlu::*;
pub use plan::*;
pub use recognition::*;
