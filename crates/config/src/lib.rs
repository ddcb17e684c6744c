//! Configuration loading, validation, and management for toolchat.
//!
//! Loads configuration from `~/.toolchat/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use toolchat_core::tool::Tool;

/// The root configuration structure.
///
/// Maps directly to `~/.toolchat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key (can also be set at runtime through the HTTP API)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model shown in CLI output; validated against `provider.models`.
    /// Chat requests always name their own model.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Max tokens per provider round
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP server configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider connection settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool backend settings and catalog overrides
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Chat title generation
    #[serde(default)]
    pub title: TitleConfig,
}

fn default_model() -> String {
    "claude-3-5-sonnet-latest".into()
}
fn default_max_tokens() -> u32 {
    1024
}

/// Redact a secret for Debug output.
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
            .field("default_model", &self.default_model)
            .field("max_tokens", &self.max_tokens)
            .field("gateway", &self.gateway)
            .field("provider", &self.provider)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("title", &self.title)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP timeout for one provider round
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Models the server accepts
    #[serde(default = "default_models")]
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_request_timeout() -> u64 {
    300
}
fn default_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig {
            id: "claude-3-5-sonnet-latest".into(),
            name: "Claude 3.5 Sonnet".into(),
            description: "Most capable model for complex, tool-heavy tasks".into(),
        },
        ModelConfig {
            id: "claude-3-5-haiku-latest".into(),
            name: "Claude 3.5 Haiku".into(),
            description: "Fastest model for quick answers".into(),
        },
    ]
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            models: default_models(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard stop for runaway tool loops
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Buffer size of the event channel between the loop and its caller
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_rounds() -> u32 {
    25
}
fn default_event_buffer() -> usize {
    128
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Time allowed for a backend to start and finish the MCP handshake
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Time allowed for listing a backend's operations
    #[serde(default = "default_list_timeout")]
    pub list_timeout_secs: u64,

    /// Time allowed for one operation call
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Tool definitions that replace or extend the built-in catalog, by id
    #[serde(default)]
    pub catalog: Vec<Tool>,
}

fn default_connect_timeout() -> u64 {
    30
}
fn default_list_timeout() -> u64 {
    10
}
fn default_call_timeout() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            list_timeout_secs: default_list_timeout(),
            call_timeout_secs: default_call_timeout(),
            catalog: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleConfig {
    #[serde(default = "default_title_model")]
    pub model: String,

    #[serde(default = "default_title_max_tokens")]
    pub max_tokens: u32,
}

fn default_title_model() -> String {
    "claude-3-5-haiku-latest".into()
}
fn default_title_max_tokens() -> u32 {
    32
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            model: default_title_model(),
            max_tokens: default_title_max_tokens(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply environment overrides (highest priority). `lookup` is
    /// `std::env::var` in production.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("TOOLCHAT_API_KEY").or_else(|| lookup("ANTHROPIC_API_KEY"));
        }

        if let Some(model) = lookup("TOOLCHAT_MODEL") {
            self.default_model = model;
        }

        if let Some(host) = lookup("TOOLCHAT_HOST") {
            self.gateway.host = host;
        }

        let port = lookup("TOOLCHAT_PORT").or_else(|| lookup("PORT"));
        if let Some(port) = port {
            match port.parse() {
                Ok(p) => self.gateway.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid port override"),
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_tokens must be greater than 0".into(),
            ));
        }

        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rounds must be greater than 0".into(),
            ));
        }

        if self.agent.event_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "agent.event_buffer must be greater than 0".into(),
            ));
        }

        if self.provider.models.is_empty() {
            return Err(ConfigError::ValidationError(
                "provider.models must list at least one model".into(),
            ));
        }

        if !self
            .provider
            .models
            .iter()
            .any(|m| m.id == self.default_model)
        {
            return Err(ConfigError::ValidationError(format!(
                "default_model '{}' is not in provider.models",
                self.default_model
            )));
        }

        for tool in &self.tools.catalog {
            if tool.id.is_empty() || tool.id.contains('_') {
                return Err(ConfigError::ValidationError(format!(
                    "tool id '{}' must be non-empty and contain no underscore",
                    tool.id
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: default_model(),
            max_tokens: default_max_tokens(),
            gateway: GatewayConfig::default(),
            provider: ProviderConfig::default(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            title: TitleConfig::default(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_model, "claude-3-5-sonnet-latest");
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.agent.max_rounds, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.provider.models, config.provider.models);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.max_tokens, 1024);
    }

    #[test]
    fn load_from_file_with_tool_catalog() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
max_tokens = 2048

[gateway]
port = 8787

[[tools.catalog]]
id = "weather"
name = "Weather"
enabled = true
package = {{ registry = "pypi", name = "mcp-weather" }}

[tools.catalog.operations.forecast]
description = "Get a forecast"
progressLabel = "Checking the weather"
doneLabel = "Checked the weather"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.gateway.port, 8787);
        assert_eq!(config.tools.catalog.len(), 1);
        assert_eq!(config.tools.catalog[0].id, "weather");
        assert!(config.tools.catalog[0].operations.contains_key("forecast"));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "max_tokens = \"lots\"").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ANTHROPIC_API_KEY", "sk-ant-env"),
            ("PORT", "9000"),
            ("TOOLCHAT_MODEL", "claude-3-5-haiku-latest"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("sk-ant-env"));
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.default_model, "claude-3-5-haiku-latest");
    }

    #[test]
    fn file_api_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("sk-file".into()),
            ..AppConfig::default()
        };
        config.apply_env_overrides(|k| (k == "ANTHROPIC_API_KEY").then(|| "sk-env".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| (k == "PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.gateway.port, 3000);
    }

    #[test]
    fn unknown_default_model_rejected() {
        let config = AppConfig {
            default_model: "gpt-4o".into(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_rounds_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_rounds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-ant-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-ant-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("claude-3-5-sonnet-latest"));
        assert!(toml_str.contains("3000"));
    }
}
