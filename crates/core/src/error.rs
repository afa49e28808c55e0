//! Error types for the ragent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them all.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all ragent operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Vector index errors ---
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    // --- Conversation memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Document loading errors ---
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    // --- Agent loop errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for building a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    #[error("Embedding dimension mismatch: index has {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Incompatible index version at {path}: expected {expected}, found {found}")]
    IncompatibleIndexVersion {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("Chunk already indexed: {0}")]
    DuplicateChunk(String),

    #[error("Invalid index configuration: {0}")]
    InvalidConfig(String),

    #[error("Index storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("Invalid memory policy: {0}")]
    InvalidPolicy(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool already registered: {0}")]
    DuplicateToolName(String),

    #[error("Invalid arguments for {tool_name}: {reason}")]
    SchemaValidation { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {cause}")]
    ExecutionFailed { tool_name: String, cause: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Unsupported source: {0}")]
    Unsupported(String),
}

/// Failure kinds of a single agent loop run.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Model output could not be parsed as an action: {0}")]
    ReasoningFormat(String),

    #[error("Step budget exceeded after {max_steps} steps")]
    StepBudgetExceeded { max_steps: usize },

    #[error("Provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid agent configuration: {0}")]
    Config(String),
}
