//! Prompt context composition.
//!
//! # Sections (in budget priority order)
//!
//! | Section | Source | Trim strategy |
//! |---------|--------|---------------|
//! | System | Agent config + tool list | Never trimmed |
//! | User | Current turn | Oldest text dropped |
//! | Trace | Steps of the current run | Oldest steps dropped |
//! | Retrieved | Vector search | Lowest-score chunks dropped |
//! | History | Conversation memory | Oldest turns dropped |

pub mod composer;

pub use composer::{
    Citation, ComposeError, ComposeInput, ComposedPrompt, CompositionMetadata, ContextComposer,
    DropInfo, PromptSection, SectionEntry, SectionKind, SectionStats,
};
