//! Conversation memory store.
//!
//! One [`ConversationMemory`] per conversation. The retention policy is
//! chosen at construction and never swapped. Writes are all-or-nothing:
//! when the summary policy needs a collapse, the summary is computed on a
//! staged copy and only committed once the summarizer has returned, so a
//! failed (or dropped) append leaves history exactly as it was.

use std::sync::Arc;
use tracing::{debug, info};

use ragent_config::{MemoryConfig, MemoryPolicyKind};
use ragent_core::error::MemoryError;
use ragent_core::memory::{MemoryTurn, Summarizer};
use ragent_core::token::{estimate_tokens, truncate_start};

/// How history is retained and selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPolicy {
    /// Keep everything; oldest turns are dropped first at read time.
    Buffer,
    /// Only the last `k` turns are considered at read time.
    Window { k: usize },
    /// Collapse the oldest turns into a summary once total tokens exceed
    /// `threshold`, keeping at most `retain_tokens` of recent turns verbatim.
    Summary { threshold: usize, retain_tokens: usize },
}

impl MemoryPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Buffer => "buffer",
            Self::Window { .. } => "window",
            Self::Summary { .. } => "summary",
        }
    }
}

pub struct ConversationMemory {
    policy: MemoryPolicy,
    summarizer: Option<Arc<dyn Summarizer>>,
    turns: Vec<MemoryTurn>,
}

impl ConversationMemory {
    /// Create a store. The summary policy requires a summarizer.
    pub fn new(
        policy: MemoryPolicy,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Result<Self, MemoryError> {
        match policy {
            MemoryPolicy::Buffer => {}
            MemoryPolicy::Window { k } => {
                if k == 0 {
                    return Err(MemoryError::InvalidPolicy("window size must be > 0".into()));
                }
            }
            MemoryPolicy::Summary {
                threshold,
                retain_tokens,
            } => {
                if retain_tokens >= threshold {
                    return Err(MemoryError::InvalidPolicy(format!(
                        "retain_tokens ({retain_tokens}) must be smaller than threshold ({threshold})"
                    )));
                }
                if summarizer.is_none() {
                    return Err(MemoryError::InvalidPolicy(
                        "summary policy requires a summarizer".into(),
                    ));
                }
            }
        }
        Ok(Self {
            policy,
            summarizer,
            turns: Vec::new(),
        })
    }

    pub fn buffer() -> Self {
        Self {
            policy: MemoryPolicy::Buffer,
            summarizer: None,
            turns: Vec::new(),
        }
    }

    pub fn window(k: usize) -> Result<Self, MemoryError> {
        Self::new(MemoryPolicy::Window { k }, None)
    }

    pub fn summary(
        threshold: usize,
        retain_tokens: usize,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self, MemoryError> {
        Self::new(
            MemoryPolicy::Summary {
                threshold,
                retain_tokens,
            },
            Some(summarizer),
        )
    }

    /// Build from the `[memory]` config section.
    pub fn from_config(
        config: &MemoryConfig,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self, MemoryError> {
        let policy = match config.policy {
            MemoryPolicyKind::Buffer => MemoryPolicy::Buffer,
            MemoryPolicyKind::Window => MemoryPolicy::Window {
                k: config.window_turns,
            },
            MemoryPolicyKind::Summary => MemoryPolicy::Summary {
                threshold: config.summary_threshold,
                retain_tokens: config.retain_tokens,
            },
        };
        Self::new(policy, Some(summarizer))
    }

    pub fn policy(&self) -> MemoryPolicy {
        self.policy
    }

    /// Full stored history, oldest first.
    pub fn turns(&self) -> &[MemoryTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn total_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.token_count).sum()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Append one turn.
    pub async fn append(&mut self, turn: MemoryTurn) -> Result<(), MemoryError> {
        self.append_all(vec![turn]).await
    }

    /// Append several turns atomically: either all land or none do.
    pub async fn append_all(&mut self, turns: Vec<MemoryTurn>) -> Result<(), MemoryError> {
        if turns.is_empty() {
            return Ok(());
        }
        let mut staged = self.turns.clone();
        staged.extend(turns);

        if let MemoryPolicy::Summary {
            threshold,
            retain_tokens,
        } = self.policy
        {
            let total: usize = staged.iter().map(|t| t.token_count).sum();
            if total > threshold {
                staged = self.collapse(staged, retain_tokens).await?;
            }
        }

        self.turns = staged;
        Ok(())
    }

    /// Replace everything before the retained suffix with one summary turn.
    async fn collapse(
        &self,
        mut staged: Vec<MemoryTurn>,
        retain_tokens: usize,
    ) -> Result<Vec<MemoryTurn>, MemoryError> {
        let split = retained_suffix_start(&staged, retain_tokens);
        let head = &staged[..split];

        // Nothing to fold, or only a previous summary: leave as is.
        if head.is_empty() || (head.len() == 1 && head[0].is_summary()) {
            return Ok(staged);
        }

        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or_else(|| MemoryError::InvalidPolicy("summary policy requires a summarizer".into()))?;

        let represented: usize = head
            .iter()
            .map(|t| {
                if t.is_summary() {
                    t.metadata.summarized_turns.max(1)
                } else {
                    1
                }
            })
            .sum();

        let text = summarizer.summarize(head).await?;
        info!(
            summarizer = summarizer.name(),
            collapsed = head.len(),
            represented,
            "Collapsed conversation history into summary"
        );

        let tail = staged.split_off(split);
        let mut collapsed = Vec::with_capacity(tail.len() + 1);
        collapsed.push(MemoryTurn::summary(text, represented));
        collapsed.extend(tail);
        Ok(collapsed)
    }

    /// Turns to include in a prompt, oldest first, within `budget` tokens.
    ///
    /// Selection keeps the most recent contiguous run that fits. If even the
    /// newest turn is larger than the budget, its oldest content is cut and
    /// the turn is flagged `truncated`.
    pub fn get_context(&self, budget: usize) -> Vec<MemoryTurn> {
        if budget == 0 {
            return Vec::new();
        }

        let candidates: &[MemoryTurn] = match self.policy {
            MemoryPolicy::Window { k } => {
                let start = self.turns.len().saturating_sub(k);
                &self.turns[start..]
            }
            MemoryPolicy::Buffer | MemoryPolicy::Summary { .. } => &self.turns,
        };

        let mut selected = Vec::new();
        let mut used = 0;
        for turn in candidates.iter().rev() {
            if used + turn.token_count <= budget {
                used += turn.token_count;
                selected.push(turn.clone());
                continue;
            }
            if selected.is_empty() {
                let mut cut = turn.clone();
                cut.content = truncate_start(&turn.content, budget).to_string();
                cut.token_count = estimate_tokens(&cut.content);
                cut.metadata.truncated = true;
                debug!(
                    original_tokens = turn.token_count,
                    kept_tokens = cut.token_count,
                    "Truncated oversized memory turn"
                );
                selected.push(cut);
            }
            break;
        }

        selected.reverse();
        selected
    }
}

/// Index where the retained suffix begins.
///
/// The suffix is the longest run of most-recent turns whose total fits in
/// `retain_tokens`, but always holds at least the newest turn.
fn retained_suffix_start(turns: &[MemoryTurn], retain_tokens: usize) -> usize {
    let mut start = turns.len().saturating_sub(1);
    let mut kept = turns.last().map_or(0, |t| t.token_count);
    while start > 0 {
        let candidate = &turns[start - 1];
        if kept + candidate.token_count > retain_tokens {
            break;
        }
        kept += candidate.token_count;
        start -= 1;
    }
    start
}
