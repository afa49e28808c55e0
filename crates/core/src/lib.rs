//! # ragent core
//!
//! Domain types, traits, and error definitions for the ragent retrieval and
//! agent runtime. This crate has **no framework dependencies**: it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external capability is a trait here (language model, embedder,
//! summarizer, document loader, vector store, tool). Implementations live in
//! their respective crates or in the embedding application, which keeps
//! tests free to plug in scripted stand-ins.

pub mod error;
pub mod token;
pub mod document;
pub mod embedding;
pub mod message;
pub mod provider;
pub mod schema;
pub mod tool;
pub mod memory;
pub mod vector_store;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{
    AgentError, Error, IndexError, LoaderError, MemoryError, ProviderError, Result, ToolError,
};
pub use document::{Chunk, Document, DocumentLoader, Metadata, MetadataValue};
pub use embedding::Embedder;
pub use message::{ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolRegistry, ToolResult};
pub use memory::{MemoryTurn, Summarizer, TurnMetadata};
pub use vector_store::{MetadataFilter, ScoredChunk, VectorStore};
pub use event::{DomainEvent, EventBus};
pub use token::estimate_tokens;
