//! Configuration loading, validation, and management for PersonaX.
//!
//! Loads configuration from `~/.personax/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use personax_core::SamplingParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.personax/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the OpenAI-compatible endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for completions
    #[serde(default = "default_model")]
    pub model: String,

    /// Max tokens per model turn (unset = provider default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// HTTP timeout for a single provider request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub persona: PersonaConfig,

    #[serde(default)]
    pub services: ServicesConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_request_timeout_secs() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("sampling", &self.sampling)
            .field("engine", &self.engine)
            .field("persona", &self.persona)
            .field("services", &self.services)
            .finish()
    }
}

/// Sampling parameters. Unset values are not sent to the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
}

impl SamplingConfig {
    pub fn to_params(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model turns allowed per completion before giving up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Same-turn tool calls executed at once (1 = sequential)
    #[serde(default = "default_tool_concurrency")]
    pub tool_concurrency: usize,
}

fn default_max_iterations() -> u32 {
    25
}
fn default_tool_concurrency() -> usize {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_concurrency: default_tool_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_name")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_persona_name() -> String {
    "personax".into()
}
fn default_system_prompt() -> String {
    "You are a helpful assistant.".into()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            version: None,
            scenario: None,
            system_prompt: default_system_prompt(),
        }
    }
}

/// External REST services used by tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub amap_weather: AmapWeatherConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AmapWeatherConfig {
    /// Amap web-service key. The weather tool is disabled without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default = "default_amap_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_amap_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_amap_retry_wait_ms")]
    pub retry_wait_ms: u64,
}

fn default_amap_timeout_secs() -> u64 {
    5
}
fn default_amap_max_retries() -> u32 {
    3
}
fn default_amap_retry_wait_ms() -> u64 {
    2000
}

impl Default for AmapWeatherConfig {
    fn default() -> Self {
        Self {
            key: None,
            timeout_secs: default_amap_timeout_secs(),
            max_retries: default_amap_max_retries(),
            retry_wait_ms: default_amap_retry_wait_ms(),
        }
    }
}

impl std::fmt::Debug for AmapWeatherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmapWeatherConfig")
            .field("key", &redact(&self.key))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_wait_ms", &self.retry_wait_ms)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.personax/config.toml).
    ///
    /// Environment variables win over the file:
    /// - `PERSONAX_API_KEY`, then `OPENAI_API_KEY`
    /// - `PERSONAX_MODEL`
    /// - `PERSONAX_BASE_URL`
    /// - `AMAP_WEATHER_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("PERSONAX_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("PERSONAX_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("PERSONAX_BASE_URL") {
            self.base_url = url;
        }
        if let Some(key) = lookup("AMAP_WEATHER_KEY") {
            self.services.amap_weather.key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".personax")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.sampling.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "sampling.temperature must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if let Some(p) = self.sampling.top_p {
            if p <= 0.0 || p > 1.0 {
                return Err(ConfigError::ValidationError(
                    "sampling.top_p must be in (0.0, 1.0]".into(),
                ));
            }
        }

        if self.engine.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_iterations must be at least 1".into(),
            ));
        }

        if self.engine.tool_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "engine.tool_concurrency must be at least 1".into(),
            ));
        }

        if self.persona.name.trim().is_empty() {
            return Err(ConfigError::ValidationError("persona.name must not be empty".into()));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config --init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
            sampling: SamplingConfig::default(),
            engine: EngineConfig::default(),
            persona: PersonaConfig::default(),
            services: ServicesConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
