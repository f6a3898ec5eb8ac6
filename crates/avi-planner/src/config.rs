//! Planner endpoint settings and the context injected into every request.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Configuration for the remote generative endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    /// API root, without the `/v1beta/...` path.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Sent as the `key` query parameter. Planning fails without it.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Upper bound for the whole streamed call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f64 {
    0.7
}
fn default_top_p() -> f64 {
    0.95
}
fn default_max_output_tokens() -> u32 {
    2048
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Runtime context embedded in the system instruction.
///
/// Every block is free-form JSON; the function catalogs map a function
/// name to its description and argument schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerContext {
    #[serde(default = "empty_object")]
    pub user_info: Value,
    #[serde(default = "empty_object")]
    pub env_info: Value,
    #[serde(default = "default_core_functions")]
    pub core_functions: Value,
    #[serde(default = "empty_object")]
    pub skill_functions: Value,
}

fn empty_object() -> Value {
    json!({})
}

/// Functions every Avi core node provides.
pub fn default_core_functions() -> Value {
    json!({
        "say": {
            "description": "Speak text to the user",
            "args": {
                "text": "string - what to say",
                "wait": "boolean - wait for speech to finish (default: true)"
            }
        },
        "listen": {
            "description": "Listen for the user's spoken reply",
            "args": { "timeout_ms": "number - maximum wait (default: 30000)" },
            "returns": "string - transcribed text"
        },
        "evaluate": {
            "description": "Evaluate a boolean expression",
            "args": { "expression": "string - expression over previous results" },
            "returns": "boolean"
        }
    })
}

impl Default for PlannerContext {
    fn default() -> Self {
        Self {
            user_info: empty_object(),
            env_info: empty_object(),
            core_functions: default_core_functions(),
            skill_functions: empty_object(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_from_empty_toml_table() {
        let config: PlannerConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.model, "gemini-1.5-flash");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.max_output_tokens, 2048);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn context_defaults_include_core_functions() {
        let ctx: PlannerContext = serde_json::from_value(json!({
            "skill_functions": { "light.set": { "description": "Control lights" } }
        }))
        .unwrap();
        assert!(ctx.core_functions.get("say").is_some());
        assert!(ctx.core_functions.get("listen").is_some());
        assert!(ctx.core_functions.get("evaluate").is_some());
        assert_eq!(ctx.user_info, json!({}));
        assert!(ctx.skill_functions.get("light.set").is_some());
    }
}
