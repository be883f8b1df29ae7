//! Model configuration for architect workflows.
//!
//! Resolution order, lowest to highest: built-in defaults, the workspace's
//! `config.toml`, then `OPENAI_*` environment variables. The API key is only
//! ever taken from the environment.

use crate::core::error::ArchitectError;
use crate::core::schemas::ARCHITECT_CONFIG_FILE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_MODEL: &str = "OPENAI_MODEL";

/// The `config.toml` file shape.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArchitectConfigFile {
    #[serde(default)]
    pub model: ModelSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelSection {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved settings for one generation-service call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// Read `config.toml` from the architect root. Absent file = defaults.
pub fn load_config_file(architect_root: &Path) -> Result<ArchitectConfigFile, ArchitectError> {
    let path = architect_root.join(ARCHITECT_CONFIG_FILE);
    if !path.exists() {
        return Ok(ArchitectConfigFile::default());
    }
    let content = fs::read_to_string(&path)?;
    Ok(toml::from_str(&content)?)
}

impl ModelConfig {
    /// Resolve from the workspace config and the process environment.
    pub fn resolve(architect_root: &Path) -> Result<Self, ArchitectError> {
        let file = load_config_file(architect_root)?;
        Self::from_sources(&file, |key| std::env::var(key).ok())
    }

    /// Resolution with an injectable environment lookup.
    pub fn from_sources(
        file: &ArchitectConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArchitectError> {
        let non_blank = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let api_key = non_blank(ENV_API_KEY).ok_or_else(|| {
            ArchitectError::ConfigError(format!(
                "{} is not set; cannot call the model to generate the architecture design",
                ENV_API_KEY
            ))
        })?;

        let base_url = non_blank(ENV_BASE_URL)
            .or_else(|| file.model.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = non_blank(ENV_MODEL)
            .or_else(|| file.model.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let temperature = file.model.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ArchitectError::ConfigError(format!(
                "temperature must be within 0.0..=2.0, got {}",
                temperature
            )));
        }

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature,
            timeout_secs: file.model.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}
