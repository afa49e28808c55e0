//! Summarizers used by the summary memory policy.
//!
//! - [`ExtractiveSummarizer`]: deterministic, no model; keeps the first
//!   sentence of each turn.
//! - [`ProviderSummarizer`]: asks a language model to progressively
//!   extend the running summary.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use ragent_core::error::MemoryError;
use ragent_core::memory::{MemoryTurn, Summarizer};
use ragent_core::message::{Message, Role};
use ragent_core::provider::{Provider, ProviderRequest};
use ragent_core::token::truncate_end;

const SUMMARY_HEADER: &str = "Summary of earlier conversation:";

/// Keeps the first sentence of every turn, capped at `max_tokens`.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    max_tokens: usize,
}

impl ExtractiveSummarizer {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(200)
    }
}

/// First sentence of `text`, or all of it when there is no sentence end.
fn first_sentence(text: &str) -> &str {
    let text = text.trim();
    text.char_indices()
        .find(|(i, c)| matches!(c, '.' | '!' | '?') && text[i + 1..].starts_with(char::is_whitespace))
        .map(|(i, _)| &text[..=i])
        .unwrap_or(text)
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn summarize(&self, turns: &[MemoryTurn]) -> Result<String, MemoryError> {
        let mut lines = vec![SUMMARY_HEADER.to_string()];
        for turn in turns {
            if turn.is_summary() {
                // Fold the previous summary's lines in without its header.
                let body = turn.content.strip_prefix(SUMMARY_HEADER).unwrap_or(&turn.content);
                lines.extend(body.lines().filter(|l| !l.trim().is_empty()).map(str::to_string));
                continue;
            }
            let sentence = first_sentence(&turn.content);
            if !sentence.is_empty() {
                lines.push(format!("- {}: {}", turn.role.as_str(), sentence));
            }
        }
        let joined = lines.join("\n");
        Ok(truncate_end(&joined, self.max_tokens).to_string())
    }
}

const SUMMARY_INSTRUCTIONS: &str = "Progressively summarize the lines of conversation provided, \
adding onto the previous summary and returning a new summary. Keep names, numbers and decisions.";

/// Delegates summarization to a language model.
pub struct ProviderSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
    timeout: Duration,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request(&self, turns: &[MemoryTurn]) -> ProviderRequest {
        let mut previous = String::new();
        let mut transcript = String::new();
        for turn in turns {
            if turn.is_summary() {
                previous.push_str(&turn.content);
                previous.push('\n');
            } else {
                transcript.push_str(&format!("{}: {}\n", turn.role.as_str(), turn.content));
            }
        }
        let prompt = format!(
            "Current summary:\n{}\nNew lines of conversation:\n{}\nNew summary:",
            if previous.is_empty() { "(none)\n" } else { previous.as_str() },
            transcript
        );
        ProviderRequest {
            model: self.model.clone(),
            messages: vec![Message::system(SUMMARY_INSTRUCTIONS), Message::user(prompt)],
            temperature: 0.0,
            max_tokens: Some(256),
            tools: vec![],
            stop: vec![],
        }
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    fn name(&self) -> &str {
        "provider"
    }

    async fn summarize(&self, turns: &[MemoryTurn]) -> Result<String, MemoryError> {
        let request = self.build_request(turns);
        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                MemoryError::SummarizationFailed(format!(
                    "{} did not answer within {}s",
                    self.provider.name(),
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| MemoryError::SummarizationFailed(e.to_string()))?;

        if response.message.role != Role::Assistant {
            return Err(MemoryError::SummarizationFailed(format!(
                "unexpected {} message from {}",
                response.message.role.as_str(),
                self.provider.name()
            )));
        }
        let summary = response.message.content.trim();
        if summary.is_empty() {
            return Err(MemoryError::SummarizationFailed("empty summary".into()));
        }
        Ok(summary.to_string())
    }
}
