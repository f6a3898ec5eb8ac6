//! Gemini `streamGenerateContent` client.
//!
//! One request per utterance: fixed system instruction plus runtime context,
//! the utterance as the single user turn, streaming enabled. The streamed
//! text fragments are concatenated and decoded as an `ActionPlan`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use avi_protocol::ActionPlan;

use crate::config::{PlannerConfig, PlannerContext};
use crate::error::{PlannerError, PlannerResult};
use crate::prompt::system_instruction;
use crate::stream::StreamAssembler;
use crate::ActionPlanner;

/// Longest error body kept in `PlannerError::Status`.
const MAX_ERROR_BODY: usize = 512;

/// Credential header; the key never appears in the request URL.
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Turn<'a>; 1],
    system_instruction: Instruction<'a>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'a str,
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct Instruction<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    max_output_tokens: u32,
}

/// Stateless client for the Gemini planner endpoint.
pub struct GeminiPlanner {
    client: reqwest::Client,
    config: PlannerConfig,
}

impl GeminiPlanner {
    pub fn new(config: PlannerConfig) -> PlannerResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PlannerError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn api_key(&self) -> PlannerResult<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(PlannerError::MissingCredential)
    }

    /// Send the request and reassemble the streamed text.
    async fn stream_text(
        &self,
        api_key: &str,
        utterance: &str,
        context: &PlannerContext,
    ) -> PlannerResult<String> {
        let instruction = system_instruction(context);
        let body = GenerateRequest {
            contents: [Turn {
                role: "user",
                parts: [TextPart { text: utterance }],
            }],
            system_instruction: Instruction {
                parts: [TextPart { text: &instruction }],
            },
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let mut response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(PlannerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut assembler = StreamAssembler::new();
        while let Some(bytes) = response
            .chunk()
            .await
            .map_err(transport_error)?
        {
            assembler.push(&bytes)?;
        }
        tracing::debug!(chunks = assembler.chunks(), "planner stream complete");
        assembler.finish()
    }
}

#[async_trait]
impl ActionPlanner for GeminiPlanner {
    async fn plan(&self, utterance: &str, context: &PlannerContext) -> PlannerResult<ActionPlan> {
        let api_key = self.api_key()?;
        let timeout_secs = self.config.timeout_secs;

        tracing::debug!(model = %self.config.model, "requesting action plan");
        let text = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.stream_text(api_key, utterance, context),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(timeout_secs, "planner call timed out");
                return Err(PlannerError::Timeout(timeout_secs));
            }
        };

        let plan = decode_plan(&text)?;
        tracing::info!(actions = plan.actions.len(), "action plan received");
        Ok(plan)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Transport failure without the request URL in its message.
fn transport_error(err: reqwest::Error) -> PlannerError {
    PlannerError::Http(err.without_url().to_string())
}

/// Decode and validate the reassembled response text.
pub fn decode_plan(text: &str) -> PlannerResult<ActionPlan> {
    let json = extract_json(text);
    if json.is_empty() {
        return Err(PlannerError::Decode("empty response".into()));
    }
    let plan = ActionPlan::from_json(json).map_err(|e| PlannerError::Decode(e.to_string()))?;
    plan.validate()?;
    Ok(plan)
}

/// Strip a markdown code fence if the model wrapped its answer in one.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();

    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let after_fence = &trimmed[start + fence.len()..];
            if let Some(end) = after_fence.find("```") {
                return after_fence[..end].trim();
            }
        }
    }

    trimmed
}
