use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which text-generation backend to use for summarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    #[default]
    OpenAi,
    /// OpenAI-compatible endpoint at a custom base URL.
    Custom,
}

/// Top-level Recap configuration, matching `recap.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecapConfig {
    #[serde(default)]
    pub mirror: MirrorSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub store: StoreSection,
}

impl RecapConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;
        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return Err(ConfigError::Invalid(format!(
                "agent.temperature must be in [0.0, 2.0], got {}",
                self.agent.temperature
            )));
        }
        if self.agent.max_tool_turns == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_tool_turns must be at least 1".to_string(),
            ));
        }
        if self.agent.provider == ProviderKind::Custom && self.agent.base_url.is_none() {
            return Err(ConfigError::Invalid(
                "agent.base_url is required when agent.provider = \"custom\"".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where repository mirrors are cloned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSection {
    pub clone_root: PathBuf,
}

impl Default for MirrorSection {
    fn default() -> Self {
        Self {
            clone_root: PathBuf::from("git_repos"),
        }
    }
}

/// Summarization agent settings: provider, model, sampling, tool budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f64,
    /// Upper bound on tool-call round trips per run. The agent decides
    /// when to call its tool; this cap only guarantees termination.
    pub max_tool_turns: u32,
    /// Override the provider's API base URL (required for `custom`).
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: "gpt-4o".to_string(),
            temperature: 0.3,
            max_tool_turns: 8,
            base_url: None,
        }
    }
}

/// Job store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub db_path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(".recap/recap.db"),
        }
    }
}
