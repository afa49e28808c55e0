//! The ragent reasoning loop.
//!
//! A run follows a **Think → Act → Observe** cycle:
//!
//! 1. **Compose** the prompt under a token budget (instructions, retrieved
//!    chunks, conversation history, the trace so far, the user turn)
//! 2. **Think**: ask the model for exactly one action
//! 3. **Act**: finish with the answer, or invoke the requested tool
//! 4. **Observe**: record the tool's result (or error) and loop back to 2
//!
//! The loop ends with a final answer, a failure, or when `max_steps` is
//! reached. [`RagSession`] wraps it with retrieval and conversation memory.

pub mod action;
pub mod context;
pub mod reasoner;
pub mod session;
pub mod trace;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use action::{FORMAT_INSTRUCTIONS, ParsedAction, parse_react, parse_response};
pub use context::{
    Citation, ComposeError, ComposeInput, ComposedPrompt, CompositionMetadata, ContextComposer,
    DropInfo, PromptSection, SectionKind,
};
pub use reasoner::{AgentOutcome, Reasoner, ReasonerSettings, RunInput, RunState};
pub use session::{RagSession, RetrievalSettings, SessionReply};
pub use trace::{AgentStep, Observation, StepAction};
