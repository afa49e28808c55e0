//! Conversation memory types and the summarizer capability.
//!
//! A conversation is an append-only list of [`MemoryTurn`]s. The only
//! mutation besides appending is a summary collapse, which replaces the
//! oldest run of turns with a single system-role summary turn.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::{Message, Role};
use crate::token::estimate_tokens;

/// Bookkeeping flags carried by a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// Content was cut to fit a budget (oldest content dropped)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,

    /// This turn is a summary of earlier turns
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub summary: bool,

    /// How many original turns a summary stands for
    #[serde(default, skip_serializing_if = "is_zero")]
    pub summarized_turns: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,

    /// Estimated token count of `content`
    pub token_count: usize,

    #[serde(default)]
    pub metadata: TurnMetadata,
}

impl MemoryTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            role,
            token_count: estimate_tokens(&content),
            content,
            timestamp: Utc::now(),
            metadata: TurnMetadata::default(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// A summary turn standing in for `summarized_turns` earlier turns.
    pub fn summary(content: impl Into<String>, summarized_turns: usize) -> Self {
        let mut turn = Self::new(Role::System, content);
        turn.metadata.summary = true;
        turn.metadata.summarized_turns = summarized_turns;
        turn
    }

    pub fn is_summary(&self) -> bool {
        self.metadata.summary
    }

    /// Convert to a wire-level message for a provider.
    pub fn to_message(&self) -> Message {
        let mut msg = match self.role {
            Role::User => Message::user(&self.content),
            Role::Assistant => Message::assistant(&self.content),
            Role::System => Message::system(&self.content),
            Role::Tool => Message::tool(&self.content),
        };
        msg.timestamp = self.timestamp;
        msg
    }
}

/// The summarizer capability used by the summary memory policy.
///
/// Implementations must not mutate anything: the memory store only applies
/// the collapse after `summarize` has returned successfully.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// The summarizer name (e.g., "extractive", "provider").
    fn name(&self) -> &str;

    /// Produce a summary of `turns`, oldest first.
    async fn summarize(&self, turns: &[MemoryTurn]) -> std::result::Result<String, MemoryError>;
}
