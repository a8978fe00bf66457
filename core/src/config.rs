//! Configuration Management Module
//!
//! File-based configuration for the LLM provider and per-role model settings,
//! with environment-variable API keys and validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::llm_transport::{LlmProvider, ProviderSettings};

/// Provider section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderFileConfig {
    /// Provider name: "openai", "anthropic", or "ollama".
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_seconds: u64,
}

impl Default for ProviderFileConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-3-sonnet".to_string(),
            base_url: None,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            timeout_seconds: 120,
        }
    }
}

/// Sampling temperature per agent role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleSettings {
    pub writer_temperature: f64,
    pub rewriter_temperature: f64,
    pub analysis_temperature: f64,
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            writer_temperature: 0.2,
            rewriter_temperature: 0.1,
            analysis_temperature: 0.15,
        }
    }
}

/// Writer output sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WriterSettings {
    /// Hard ceiling on writer output tokens per call.
    pub max_output_tokens: u32,
    /// Budget granted per slot in a group call.
    pub tokens_per_slot: u32,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            max_output_tokens: 8192,
            tokens_per_slot: 1400,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub provider: ProviderFileConfig,
    pub roles: RoleSettings,
    pub writer: WriterSettings,
}

impl PipelineConfig {
    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: PipelineConfig =
            toml::from_str(&raw).with_context(|| "failed to parse config file")?;
        config.validate()?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check the config for unusable values, naming the offending field.
    pub fn validate(&self) -> Result<()> {
        self.provider
            .provider
            .parse::<LlmProvider>()
            .with_context(|| "provider.provider")?;
        if self.provider.model.trim().is_empty() {
            return Err(anyhow!("provider.model must not be empty"));
        }
        if self.provider.timeout_seconds == 0 {
            return Err(anyhow!("provider.timeoutSeconds must be positive"));
        }
        for (name, temp) in [
            ("roles.writerTemperature", self.roles.writer_temperature),
            ("roles.rewriterTemperature", self.roles.rewriter_temperature),
            ("roles.analysisTemperature", self.roles.analysis_temperature),
        ] {
            if !(0.0..=2.0).contains(&temp) {
                return Err(anyhow!("{} must be within 0.0..=2.0", name));
            }
        }
        if self.writer.max_output_tokens == 0 || self.writer.max_output_tokens > 8192 {
            return Err(anyhow!("writer.maxOutputTokens must be within 1..=8192"));
        }
        Ok(())
    }

    /// Resolve the provider connection settings, reading the API key from the
    /// configured environment variable.
    pub fn provider_settings(&self) -> Result<ProviderSettings> {
        let provider = self.provider.provider.parse::<LlmProvider>()?;
        let api_key = std::env::var(&self.provider.api_key_env).ok();
        if api_key.is_none() {
            debug!(
                "environment variable {} not set; provider may reject calls",
                self.provider.api_key_env
            );
        }
        Ok(ProviderSettings {
            provider,
            api_key,
            base_url: self.provider.base_url.clone(),
            timeout_seconds: self.provider.timeout_seconds,
        })
    }

    /// Writer max tokens for a group of `group_size` slots, capped at the
    /// configured ceiling.
    pub fn writer_max_tokens(&self, group_size: usize) -> u32 {
        (group_size as u32)
            .saturating_mul(self.writer.tokens_per_slot)
            .min(self.writer.max_output_tokens)
    }
}
