//! Context composition — fitting the prompt into a token budget.
//!
//! Builds an ordered list of labeled sections from five inputs:
//!
//! 1. **System** instructions — never truncated; an error if alone over budget
//! 2. **User** turn — truncated from the start if needed
//! 3. **Trace** of agent steps — most recent steps kept first
//! 4. **Retrieved** chunks — highest score kept first
//! 5. **History** from memory — most recent turns kept first
//!
//! Budget is granted in that priority order, so lower priorities are
//! truncated or dropped before higher ones are touched. A section that would
//! end up smaller than `min_section_tokens` after truncation is dropped
//! instead. Output order is System, Retrieved, History, Trace, User.
//!
//! # Determinism
//!
//! Identical inputs and budget always produce identical sections. No random
//! or time-dependent logic is used.

use ragent_config::ComposerConfig;
use ragent_core::memory::MemoryTurn;
use ragent_core::message::{Message, Role};
use ragent_core::token::{estimate_tokens, truncate_end, truncate_start};
use ragent_core::vector_store::ScoredChunk;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trace::AgentStep;

const RETRIEVED_HEADER: &str = "\n\n[Retrieved Context]\n";
const HISTORY_HEADER: &str = "[Conversation History]\n";
const TRACE_HEADER: &str = "[Agent Trace]\n";
/// Entries are joined with a newline; each join costs one token.
const SEPARATOR_TOKENS: usize = 1;

// ── Types ─────────────────────────────────────────────────────────────────

/// Everything the composer may put into one prompt.
#[derive(Debug, Clone, Copy)]
pub struct ComposeInput<'a> {
    pub system: &'a str,
    pub user_turn: &'a str,
    /// Retrieved chunks; re-sorted by descending score
    pub retrieved: &'a [ScoredChunk],
    /// Memory turns, chronological
    pub memory: &'a [MemoryTurn],
    /// Steps completed so far in the current run, chronological
    pub trace: &'a [AgentStep],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    System,
    Retrieved,
    History,
    Trace,
    User,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Retrieved => "retrieved",
            Self::History => "history",
            Self::Trace => "trace",
            Self::User => "user",
        }
    }

    fn header(&self) -> &'static str {
        match self {
            Self::Retrieved => RETRIEVED_HEADER,
            Self::History => HISTORY_HEADER,
            Self::Trace => TRACE_HEADER,
            Self::System | Self::User => "",
        }
    }
}

/// Where a retrieved entry came from, for citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub document_id: String,
    pub score: f32,
    pub source: String,
}

impl Citation {
    fn of(hit: &ScoredChunk) -> Self {
        Self {
            chunk_id: hit.chunk.id.clone(),
            document_id: hit.chunk.document_id.clone(),
            score: hit.score,
            source: hit.chunk.source().to_string(),
        }
    }
}

/// One item inside a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionEntry {
    pub role: Role,
    pub text: String,
    pub tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<Citation>,
    #[serde(default)]
    pub truncated: bool,
}

/// A labeled block of the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSection {
    pub kind: SectionKind,
    pub entries: Vec<SectionEntry>,
    /// Entries plus header
    pub tokens: usize,
}

impl PromptSection {
    fn render(&self) -> String {
        let body: Vec<&str> = self.entries.iter().map(|e| e.text.as_str()).collect();
        format!("{}{}", self.kind.header(), body.join("\n"))
    }
}

/// Statistics for one section kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionStats {
    pub kind: SectionKind,
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Content left out while enforcing the budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropInfo {
    pub kind: SectionKind,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionMetadata {
    pub budget: usize,
    pub total_tokens: usize,
    /// Budget held back for turns appended after composition
    #[serde(default)]
    pub reserved: usize,
    pub per_section: Vec<SectionStats>,
    pub drops: Vec<DropInfo>,
}

/// The composed prompt, ready to be flattened into provider messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompt {
    pub sections: Vec<PromptSection>,
    pub metadata: CompositionMetadata,
}

impl ComposedPrompt {
    pub fn section(&self, kind: SectionKind) -> Option<&PromptSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Citations for every retrieved chunk that made it into the prompt.
    pub fn citations(&self) -> Vec<Citation> {
        self.section(SectionKind::Retrieved)
            .map(|s| s.entries.iter().filter_map(|e| e.citation.clone()).collect())
            .unwrap_or_default()
    }

    /// Flatten into messages: one system message carrying the instructions
    /// and retrieved context, then history turns in their own roles, then
    /// the trace scratchpad and the user turn.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::new();

        let mut system = String::new();
        if let Some(s) = self.section(SectionKind::System) {
            system.push_str(&s.render());
        }
        if let Some(s) = self.section(SectionKind::Retrieved) {
            system.push_str(&s.render());
        }
        if !system.is_empty() {
            messages.push(Message::system(system));
        }

        if let Some(s) = self.section(SectionKind::History) {
            for entry in &s.entries {
                messages.push(match entry.role {
                    Role::User => Message::user(&entry.text),
                    Role::Assistant => Message::assistant(&entry.text),
                    Role::Tool => Message::tool(&entry.text),
                    Role::System => Message::system(&entry.text),
                });
            }
        }
        if let Some(s) = self.section(SectionKind::Trace) {
            messages.push(Message::assistant(s.render()));
        }
        if let Some(s) = self.section(SectionKind::User) {
            messages.push(Message::user(s.render()));
        }
        messages
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("System instructions ({system_tokens} tokens) exceed the budget ({budget} tokens)")]
    SystemExceedsBudget { system_tokens: usize, budget: usize },
}

// ── Composer ──────────────────────────────────────────────────────────────

/// The context composer. Stateless — create one and reuse it.
#[derive(Debug, Clone)]
pub struct ContextComposer {
    budget: usize,
    min_section_tokens: usize,
}

impl Default for ContextComposer {
    fn default() -> Self {
        Self::from_config(&ComposerConfig::default())
    }
}

/// How an overflowing entry is shortened.
#[derive(Debug, Clone, Copy)]
enum Keep {
    /// Keep the newest text (end)
    Tail,
    /// Keep the leading text (start)
    Head,
}

/// Candidate entry before budgeting, in priority order.
struct Candidate {
    role: Role,
    text: String,
    citation: Option<Citation>,
}

/// Outcome of filling one section.
struct Filled {
    section: Option<PromptSection>,
    stats: SectionStats,
    drop: Option<DropInfo>,
}

impl ContextComposer {
    pub fn new(budget: usize, min_section_tokens: usize) -> Self {
        Self {
            budget,
            min_section_tokens,
        }
    }

    pub fn from_config(config: &ComposerConfig) -> Self {
        Self::new(config.token_budget, config.min_section_tokens)
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Compose the prompt for one model call.
    pub fn compose(&self, input: &ComposeInput<'_>) -> Result<ComposedPrompt, ComposeError> {
        self.compose_reserving(input, 0)
    }

    /// Compose while keeping `reserved` tokens free for messages the caller
    /// appends afterwards, such as a corrective instruction.
    pub fn compose_reserving(
        &self,
        input: &ComposeInput<'_>,
        reserved: usize,
    ) -> Result<ComposedPrompt, ComposeError> {
        let budget = self.budget.saturating_sub(reserved);
        let system_tokens = estimate_tokens(input.system);
        if system_tokens > budget {
            return Err(ComposeError::SystemExceedsBudget { system_tokens, budget });
        }
        let mut remaining = budget - system_tokens;
        let mut per_section = vec![SectionStats {
            kind: SectionKind::System,
            tokens: system_tokens,
            items_included: usize::from(!input.system.is_empty()),
            items_total: usize::from(!input.system.is_empty()),
        }];
        let mut drops = Vec::new();

        let system = (!input.system.is_empty()).then(|| PromptSection {
            kind: SectionKind::System,
            entries: vec![SectionEntry {
                role: Role::System,
                text: input.system.to_string(),
                tokens: system_tokens,
                citation: None,
                truncated: false,
            }],
            tokens: system_tokens,
        });

        // Priority 2: the user turn.
        let user_candidates: Vec<Candidate> = if input.user_turn.is_empty() {
            Vec::new()
        } else {
            vec![Candidate {
                role: Role::User,
                text: input.user_turn.to_string(),
                citation: None,
            }]
        };
        let user = self.fill(SectionKind::User, user_candidates, remaining, Keep::Tail, "User turn truncated from the start");
        remaining -= user.stats.tokens;

        // Priority 3: trace, newest first.
        let trace_candidates = input
            .trace
            .iter()
            .rev()
            .map(|step| Candidate {
                role: Role::Assistant,
                text: step.render().trim_end().to_string(),
                citation: None,
            })
            .collect();
        let trace = self.fill(SectionKind::Trace, trace_candidates, remaining, Keep::Tail, "Oldest steps dropped");
        remaining -= trace.stats.tokens;

        // Priority 4: retrieved chunks, best score first. Stable sort keeps
        // the index's tie order.
        let mut hits: Vec<&ScoredChunk> = input.retrieved.iter().collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        let retrieved_candidates = hits
            .iter()
            .enumerate()
            .map(|(i, hit)| Candidate {
                role: Role::System,
                text: format!(
                    "[{}] {} (score {:.2}, source: {})\n{}",
                    i + 1,
                    hit.chunk.id,
                    hit.score,
                    hit.chunk.source(),
                    hit.chunk.text
                ),
                citation: Some(Citation::of(hit)),
            })
            .collect();
        let retrieved = self.fill(
            SectionKind::Retrieved,
            retrieved_candidates,
            remaining,
            Keep::Head,
            "Lowest-scoring chunks dropped",
        );
        remaining -= retrieved.stats.tokens;

        // Priority 5: memory, newest first.
        let history_candidates = input
            .memory
            .iter()
            .rev()
            .map(|turn| Candidate {
                role: turn.role,
                text: turn.content.clone(),
                citation: None,
            })
            .collect();
        let history = self.fill(SectionKind::History, history_candidates, remaining, Keep::Tail, "Oldest turns dropped");

        let mut sections: Vec<PromptSection> = Vec::new();
        sections.extend(system);
        for filled in [retrieved, history, trace, user] {
            per_section.push(filled.stats);
            drops.extend(filled.drop);
            sections.extend(filled.section);
        }

        let total_tokens = sections.iter().map(|s| s.tokens).sum();
        Ok(ComposedPrompt {
            sections,
            metadata: CompositionMetadata {
                budget: self.budget,
                total_tokens,
                reserved,
                per_section,
                drops,
            },
        })
    }

    /// Take candidates in priority order while they fit in `available`.
    ///
    /// `used` counts the header, every entry and the separator before each
    /// entry after the first, so the rendered section never costs more than
    /// the section's `tokens`.
    ///
    /// The first candidate that does not fit is shortened (if the room left
    /// is at least `min_section_tokens`) and everything after it is dropped.
    /// Entries are returned in chronological order: candidates arrive
    /// newest-first for trace/history/user and are reversed back, while
    /// retrieved chunks keep their score order.
    fn fill(
        &self,
        kind: SectionKind,
        candidates: Vec<Candidate>,
        available: usize,
        keep: Keep,
        reason: &str,
    ) -> Filled {
        let total = candidates.len();
        let mut stats = SectionStats {
            kind,
            tokens: 0,
            items_included: 0,
            items_total: total,
        };
        if total == 0 {
            return Filled {
                section: None,
                stats,
                drop: None,
            };
        }

        let all_tokens: usize = candidates.iter().map(|c| estimate_tokens(&c.text)).sum();
        let header_tokens = estimate_tokens(kind.header());
        let mut entries: Vec<SectionEntry> = Vec::new();
        let mut used = header_tokens;
        let mut shortened = false;

        if header_tokens < available {
            for candidate in candidates {
                let separator = if entries.is_empty() { 0 } else { SEPARATOR_TOKENS };
                let tokens = estimate_tokens(&candidate.text);
                if used + separator + tokens <= available {
                    used += separator + tokens;
                    entries.push(SectionEntry {
                        role: candidate.role,
                        text: candidate.text,
                        tokens,
                        citation: candidate.citation,
                        truncated: false,
                    });
                    continue;
                }

                shortened = true;
                let room = available.saturating_sub(used + separator);
                if room >= self.min_section_tokens.max(1) {
                    let text = match keep {
                        Keep::Tail => truncate_start(&candidate.text, room),
                        Keep::Head => truncate_end(&candidate.text, room),
                    };
                    let tokens = estimate_tokens(text);
                    if tokens > 0 {
                        used += separator + tokens;
                        entries.push(SectionEntry {
                            role: candidate.role,
                            text: text.to_string(),
                            tokens,
                            citation: candidate.citation,
                            truncated: true,
                        });
                    }
                }
                break;
            }
        } else {
            shortened = true;
        }

        let content_tokens = used - header_tokens;
        if entries.is_empty() || (shortened && content_tokens < self.min_section_tokens) {
            return Filled {
                section: None,
                stats,
                drop: Some(DropInfo {
                    kind,
                    items_dropped: total,
                    tokens_dropped: all_tokens,
                    reason: format!("No room for {} section", kind.as_str()),
                }),
            };
        }

        let included = entries.len();
        let included_tokens: usize = entries.iter().map(|e| e.tokens).sum();
        let partial = entries.iter().filter(|e| e.truncated).count();
        if !matches!(kind, SectionKind::Retrieved) {
            entries.reverse();
        }

        stats.tokens = used;
        stats.items_included = included;
        let dropped = total - included + partial;
        let drop = (dropped > 0).then(|| DropInfo {
            kind,
            items_dropped: total - included,
            tokens_dropped: all_tokens.saturating_sub(included_tokens),
            reason: reason.to_string(),
        });

        Filled {
            section: Some(PromptSection {
                kind,
                entries,
                tokens: used,
            }),
            stats,
            drop,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
