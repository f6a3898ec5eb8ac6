//! NLU server configuration: TOML file plus environment overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::Deserialize;

use avi_planner::{PlannerConfig, PlannerContext};
use avi_protocol::Language;

/// Intent probability below which the planner takes over.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.25;

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NluConfig {
    /// Listen address (e.g., "0.0.0.0").
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port. Avi clients expect 1178.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Language active at startup.
    #[serde(default)]
    pub language: Language,
    /// Base path holding `engine/<lang>` and `dataset/dataset_<lang>.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Train when `reuse` finds no persisted model.
    #[serde(default = "default_train_on_miss")]
    pub train_on_miss: bool,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub context: PlannerContext,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1178
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/intent_recognition")
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_train_on_miss() -> bool {
    true
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            language: Language::default(),
            data_dir: default_data_dir(),
            confidence_threshold: default_confidence_threshold(),
            train_on_miss: default_train_on_miss(),
            planner: PlannerConfig::default(),
            context: PlannerContext::default(),
        }
    }
}

impl NluConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// File (or defaults) with environment overrides applied.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `AVI_*` / `GEMINI_*` overrides from `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        if let Some(host) = lookup("AVI_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("AVI_PORT") {
            self.port = port.parse().with_context(|| format!("AVI_PORT={port}"))?;
        }
        if let Some(lang) = lookup("AVI_LANG") {
            self.language = lang.parse()?;
        }
        if let Some(dir) = lookup("AVI_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(threshold) = lookup("AVI_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = threshold
                .parse()
                .with_context(|| format!("AVI_CONFIDENCE_THRESHOLD={threshold}"))?;
        }
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.planner.api_key = Some(key);
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.planner.model = model;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            bail!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            );
        }
        if self.planner.timeout_secs == 0 {
            bail!("planner.timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config() {
        let config = NluConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 1178);
        assert_eq!(config.language, Language::En);
        assert_eq!(config.confidence_threshold, 0.25);
        assert!(config.train_on_miss);
        assert!(config.planner.api_key.is_none());
        assert_eq!(config.listen_addr(), "0.0.0.0:1178");
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
port = 8080
language = "pt"
data_dir = "/var/lib/avi"
confidence_threshold = 0.4
train_on_miss = false

[planner]
model = "gemini-2.0-flash"
timeout_secs = 20

[context.user_info]
name = "Rita"

[context.skill_functions."light.set"]
description = "Control smart lights"
"#;
        let config: NluConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.language, Language::Pt);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/avi"));
        assert!(!config.train_on_miss);
        assert_eq!(config.planner.model, "gemini-2.0-flash");
        assert_eq!(config.planner.timeout_secs, 20);
        assert_eq!(config.planner.max_output_tokens, 2048); // default
        assert_eq!(config.context.user_info["name"], "Rita");
        assert!(config.context.core_functions.get("say").is_some()); // default
        assert!(config.context.skill_functions.get("light.set").is_some());
    }

    #[test]
    fn environment_overrides_file_values() {
        let config = NluConfig::default()
            .with_overrides(env(&[
                ("AVI_PORT", "9000"),
                ("AVI_LANG", "pt_pt"),
                ("AVI_CONFIDENCE_THRESHOLD", "0.5"),
                ("GEMINI_API_KEY", "secret"),
                ("GEMINI_MODEL", "gemini-pro"),
            ]))
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.language, Language::Pt);
        assert_eq!(config.confidence_threshold, 0.5);
        assert_eq!(config.planner.api_key.as_deref(), Some("secret"));
        assert_eq!(config.planner.model, "gemini-pro");
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        assert!(NluConfig::default().with_overrides(env(&[("AVI_PORT", "http")])).is_err());
        assert!(NluConfig::default().with_overrides(env(&[("AVI_LANG", "fr")])).is_err());
        assert!(
            NluConfig::default()
                .with_overrides(env(&[("AVI_CONFIDENCE_THRESHOLD", "1.5")]))
                .is_err()
        );
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("avi.toml");
        std::fs::write(&path, "port = 1200\n").unwrap();
        let config = NluConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 1200);
        assert_eq!(config.host, "0.0.0.0");
    }
}
