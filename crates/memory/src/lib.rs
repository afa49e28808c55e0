//! Conversation memory for ragent.
//!
//! [`ConversationMemory`] stores the turns of one conversation under a
//! fixed [`MemoryPolicy`]; summarizers back the summary policy.

pub mod store;
pub mod summarizer;

pub use store::{ConversationMemory, MemoryPolicy};
pub use summarizer::{ExtractiveSummarizer, ProviderSummarizer};
