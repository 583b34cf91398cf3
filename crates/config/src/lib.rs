//! Configuration loading, validation, and management for Sidekick.
//!
//! Loads configuration from `~/.sidekick/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.sidekick/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider name, used in logs
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model used by the worker
    #[serde(default = "default_model")]
    pub worker_model: String,

    /// Model used by the evaluator
    #[serde(default = "default_model")]
    pub evaluator_model: String,

    /// Sampling temperature for the worker
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout for model calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Worker/evaluator loop settings
    #[serde(default, rename = "loop")]
    pub run_loop: LoopConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Built-in tool configuration
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_request_timeout() -> u64 {
    120
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
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("worker_model", &self.worker_model)
            .field("evaluator_model", &self.evaluator_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("run_loop", &self.run_loop)
            .field("gateway", &self.gateway)
            .field("tools", &self.tools)
            .finish()
    }
}

/// Settings for the worker/evaluator loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Worker invocations allowed per run before a forced halt
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Consecutive similar answers that count as stuck
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold: usize,

    /// Word-set Jaccard similarity at which two answers count as repeats
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Per-call tool timeout
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_max_iterations() -> u32 {
    25
}
fn default_stuck_threshold() -> usize {
    3
}
fn default_similarity_threshold() -> f64 {
    0.9
}
fn default_tool_timeout() -> u64 {
    60
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            stuck_threshold: default_stuck_threshold(),
            similarity_threshold: default_similarity_threshold(),
            tool_timeout_secs: default_tool_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy for transient model failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    8_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Upper bound on live sessions; the oldest idle one is evicted
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_port() -> u16 {
    7860
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_sessions() -> usize {
    256
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Settings for the built-in tools.
#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// The only directory file tools may touch
    #[serde(default = "default_sandbox_dir")]
    pub sandbox_dir: PathBuf,

    /// Serper API key; the `search` tool is disabled without it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serper_api_key: Option<String>,

    #[serde(default = "default_serper_url")]
    pub serper_url: String,

    /// Pushover credentials; `send_push_notification` is disabled without them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushover_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pushover_user: Option<String>,

    #[serde(default = "default_pushover_url")]
    pub pushover_url: String,

    #[serde(default = "default_wikipedia_url")]
    pub wikipedia_url: String,

    /// Register the `python_repl` tool
    #[serde(default = "default_true")]
    pub enable_python: bool,

    #[serde(default = "default_python_command")]
    pub python_command: String,

    #[serde(default = "default_python_timeout")]
    pub python_timeout_secs: u64,

    /// Page text returned by `navigate_browser` is cut at this many chars
    #[serde(default = "default_max_page_chars")]
    pub max_page_chars: usize,
}

fn default_sandbox_dir() -> PathBuf {
    PathBuf::from("sandbox")
}
fn default_serper_url() -> String {
    "https://google.serper.dev/search".into()
}
fn default_pushover_url() -> String {
    "https://api.pushover.net/1/messages.json".into()
}
fn default_wikipedia_url() -> String {
    "https://en.wikipedia.org/w/api.php".into()
}
fn default_true() -> bool {
    true
}
fn default_python_command() -> String {
    "python3".into()
}
fn default_python_timeout() -> u64 {
    30
}
fn default_max_page_chars() -> usize {
    8_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            sandbox_dir: default_sandbox_dir(),
            serper_api_key: None,
            serper_url: default_serper_url(),
            pushover_token: None,
            pushover_user: None,
            pushover_url: default_pushover_url(),
            wikipedia_url: default_wikipedia_url(),
            enable_python: true,
            python_command: default_python_command(),
            python_timeout_secs: default_python_timeout(),
            max_page_chars: default_max_page_chars(),
        }
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("sandbox_dir", &self.sandbox_dir)
            .field("serper_api_key", &redact(&self.serper_api_key))
            .field("serper_url", &self.serper_url)
            .field("pushover_token", &redact(&self.pushover_token))
            .field("pushover_user", &redact(&self.pushover_user))
            .field("pushover_url", &self.pushover_url)
            .field("wikipedia_url", &self.wikipedia_url)
            .field("enable_python", &self.enable_python)
            .field("python_command", &self.python_command)
            .field("python_timeout_secs", &self.python_timeout_secs)
            .field("max_page_chars", &self.max_page_chars)
            .finish()
    }
}

impl ToolsConfig {
    pub fn has_search(&self) -> bool {
        self.serper_api_key.is_some()
    }

    pub fn has_push(&self) -> bool {
        self.pushover_token.is_some() && self.pushover_user.is_some()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.sidekick/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides using the given lookup.
    ///
    /// - `SIDEKICK_API_KEY`, then `OPENAI_API_KEY` (only when no key is set)
    /// - `SIDEKICK_API_URL`, `SIDEKICK_MODEL`
    /// - `SERPER_API_KEY`, `PUSHOVER_TOKEN`, `PUSHOVER_USER`
    /// - `SIDEKICK_SANDBOX`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("SIDEKICK_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("SIDEKICK_API_URL") {
            self.api_url = url;
        }
        if let Some(model) = lookup("SIDEKICK_MODEL") {
            self.worker_model = model.clone();
            self.evaluator_model = model;
        }
        if let Some(key) = lookup("SERPER_API_KEY") {
            self.tools.serper_api_key = Some(key);
        }
        if let Some(token) = lookup("PUSHOVER_TOKEN") {
            self.tools.pushover_token = Some(token);
        }
        if let Some(user) = lookup("PUSHOVER_USER") {
            self.tools.pushover_user = Some(user);
        }
        if let Some(dir) = lookup("SIDEKICK_SANDBOX") {
            self.tools.sandbox_dir = PathBuf::from(dir);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sidekick")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.run_loop.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "loop.max_iterations must be at least 1".into(),
            ));
        }
        if self.run_loop.stuck_threshold < 2 {
            return Err(ConfigError::ValidationError(
                "loop.stuck_threshold must be at least 2".into(),
            ));
        }
        if !(self.run_loop.similarity_threshold > 0.0 && self.run_loop.similarity_threshold <= 1.0)
        {
            return Err(ConfigError::ValidationError(
                "loop.similarity_threshold must be in (0.0, 1.0]".into(),
            ));
        }
        if self.run_loop.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "loop.retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.gateway.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.max_sessions must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: default_api_url(),
            worker_model: default_model(),
            evaluator_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            run_loop: LoopConfig::default(),
            gateway: GatewayConfig::default(),
            tools: ToolsConfig::default(),
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
