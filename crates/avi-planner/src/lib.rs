//! Remote action planner for the Avi NLU server.
//!
//! When the local classifier is not confident, the utterance goes to a
//! generative model that answers with an `ActionPlan`. The call is
//! stateless: every request carries the full system instruction and the
//! runtime context (user, environment, function catalogs).

pub mod config;
pub mod error;
pub mod gemini;
pub mod prompt;
pub mod stream;

use async_trait::async_trait;
use avi_protocol::ActionPlan;

pub use config::{PlannerConfig, PlannerContext};
pub use error::{PlannerError, PlannerResult};
pub use gemini::GeminiPlanner;
pub use stream::StreamAssembler;

/// Produces an action plan for an utterance the classifier could not handle.
#[async_trait]
pub trait ActionPlanner: Send + Sync {
    async fn plan(&self, utterance: &str, context: &PlannerContext) -> PlannerResult<ActionPlan>;

    /// Name of this planner (for logging).
    fn name(&self) -> &str;
}
