//! Configuration loading, validation, and management for ragent.
//!
//! Loads configuration from `~/.ragent/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ragent/config.toml`. Every section and field has a
/// default, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// How documents are split into chunks
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Vector index settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Conversation memory policy
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Prompt budget settings
    #[serde(default)]
    pub composer: ComposerConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool registry settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Query-time retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

// --- chunking ---

/// Unit in which chunk sizes are measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeUnit {
    #[default]
    Characters,
    Tokens,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub max_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,

    #[serde(default)]
    pub unit: SizeUnit,
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
            unit: SizeUnit::default(),
        }
    }
}

// --- index ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Embedding dimensionality; fixed for the lifetime of an index
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Snapshot location; defaults to `~/.ragent/index.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Maximum embeddings computed concurrently during ingestion
    #[serde(default = "default_ingest_concurrency")]
    pub ingest_concurrency: usize,
}

fn default_dimensions() -> usize {
    512
}
fn default_ingest_concurrency() -> usize {
    8
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            path: None,
            ingest_concurrency: default_ingest_concurrency(),
        }
    }
}

// --- memory ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPolicyKind {
    #[default]
    Buffer,
    Window,
    Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub policy: MemoryPolicyKind,

    /// Turns kept by the window policy
    #[serde(default = "default_window_turns")]
    pub window_turns: usize,

    /// Total tokens above which the summary policy collapses history
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold: usize,

    /// Tokens of recent history kept verbatim after a collapse
    #[serde(default = "default_retain_tokens")]
    pub retain_tokens: usize,
}

fn default_window_turns() -> usize {
    10
}
fn default_summary_threshold() -> usize {
    2000
}
fn default_retain_tokens() -> usize {
    500
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            policy: MemoryPolicyKind::default(),
            window_turns: default_window_turns(),
            summary_threshold: default_summary_threshold(),
            retain_tokens: default_retain_tokens(),
        }
    }
}

// --- composer ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposerConfig {
    /// Total prompt budget in tokens
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Sections smaller than this after truncation are dropped
    #[serde(default = "default_min_section_tokens")]
    pub min_section_tokens: usize,
}

fn default_token_budget() -> usize {
    4000
}
fn default_min_section_tokens() -> usize {
    8
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            min_section_tokens: default_min_section_tokens(),
        }
    }
}

// --- agent ---

/// What to do when the step budget runs out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarlyStopping {
    /// Synthesize an answer from the trace
    #[default]
    Force,
    /// One extra tool-less model call
    Generate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    #[serde(default)]
    pub early_stopping: EarlyStopping,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_max_steps() -> usize {
    5
}
fn default_model_timeout_secs() -> u64 {
    60
}
fn default_system_prompt() -> String {
    "You are a helpful assistant. Answer using the retrieved context and the \
     available tools. If the context does not contain the answer, say so."
        .into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_steps: default_max_steps(),
            model_timeout_secs: default_model_timeout_secs(),
            early_stopping: EarlyStopping::default(),
            system_prompt: default_system_prompt(),
        }
    }
}

// --- tools ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per-call execution timeout
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,

    /// Built-in tools to register; empty means all of them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled: Vec<String>,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            enabled: Vec::new(),
        }
    }
}

impl ToolsConfig {
    /// Is the named built-in enabled?
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.is_empty() || self.enabled.iter().any(|n| n == name)
    }
}

// --- retrieval ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Chunks scoring below this are not retrieved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,

    /// Rewrite follow-up questions into standalone ones (using the
    /// conversation history) before searching
    #[serde(default)]
    pub condense_question: bool,
}

fn default_top_k() -> usize {
    4
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
            condense_question: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ragent/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `RAGENT_MODEL`
    /// - `RAGENT_MAX_STEPS`
    /// - `RAGENT_TOKEN_BUDGET`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides and validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Takes the lookup as a closure so tests don't touch process state.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(model) = lookup("RAGENT_MODEL") {
            self.agent.model = model;
        }
        if let Some(raw) = lookup("RAGENT_MAX_STEPS") {
            self.agent.max_steps = parse_env("RAGENT_MAX_STEPS", &raw)?;
        }
        if let Some(raw) = lookup("RAGENT_TOKEN_BUDGET") {
            self.composer.token_budget = parse_env("RAGENT_TOKEN_BUDGET", &raw)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragent")
    }

    /// Where the index snapshot lives.
    pub fn index_path(&self) -> PathBuf {
        self.index
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("index.json"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.into()));

        if self.chunking.max_size == 0 {
            return invalid("chunking.max_size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.max_size {
            return invalid("chunking.overlap must be smaller than chunking.max_size");
        }
        if self.index.dimensions == 0 {
            return invalid("index.dimensions must be > 0");
        }
        if self.index.ingest_concurrency == 0 {
            return invalid("index.ingest_concurrency must be > 0");
        }
        if self.memory.policy == MemoryPolicyKind::Window && self.memory.window_turns == 0 {
            return invalid("memory.window_turns must be > 0 for the window policy");
        }
        if self.memory.policy == MemoryPolicyKind::Summary
            && self.memory.retain_tokens >= self.memory.summary_threshold
        {
            return invalid("memory.retain_tokens must be smaller than memory.summary_threshold");
        }
        if self.composer.token_budget == 0 {
            return invalid("composer.token_budget must be > 0");
        }
        if self.agent.max_steps == 0 {
            return invalid("agent.max_steps must be > 0");
        }
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            return invalid("agent.temperature must be between 0.0 and 2.0");
        }
        if self.agent.model_timeout_secs == 0 {
            return invalid("agent.model_timeout_secs must be > 0");
        }
        if self.tools.timeout_secs == 0 {
            return invalid("tools.timeout_secs must be > 0");
        }
        if self.retrieval.top_k == 0 {
            return invalid("retrieval.top_k must be > 0");
        }
        if let Some(min) = self.retrieval.min_score
            && !(-1.0..=1.0).contains(&min)
        {
            return invalid("retrieval.min_score must be between -1.0 and 1.0");
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: raw.to_string(),
    })
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

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for ragent_core::Error {
    fn from(e: ConfigError) -> Self {
        ragent_core::Error::config(e.to_string())
    }
}
