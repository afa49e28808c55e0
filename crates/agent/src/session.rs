//! Retrieval-augmented conversation: one [`RagSession`] per conversation.
//!
//! Each turn reads the conversation memory, optionally condenses a follow-up
//! into a standalone question, retrieves the most relevant chunks for it,
//! runs the [`Reasoner`] and only then appends the exchange to memory. A run
//! that never produced an answer leaves memory untouched.

use std::sync::Arc;
use tracing::{debug, info, warn};

use ragent_config::RetrievalConfig;
use ragent_core::embedding::Embedder;
use ragent_core::error::{Error, IndexError, MemoryError, Result};
use ragent_core::memory::MemoryTurn;
use ragent_core::message::ConversationId;
use ragent_core::vector_store::{MetadataFilter, ScoredChunk, VectorStore};
use ragent_memory::ConversationMemory;

use crate::reasoner::{AgentOutcome, Reasoner, RunInput};

/// Query-time retrieval parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub min_score: Option<f32>,
    pub filter: Option<MetadataFilter>,
    /// Search with a standalone rewrite of follow-up questions
    pub condense_question: bool,
}

impl RetrievalSettings {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            min_score: config.min_score,
            filter: None,
            condense_question: config.condense_question,
        }
    }

    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            min_score: None,
            filter: None,
            condense_question: false,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// The result of one conversational turn.
#[derive(Debug, Clone)]
pub struct SessionReply {
    pub outcome: AgentOutcome,
    /// The text that was searched for: the user turn or its standalone rewrite
    pub query: String,
    /// Everything retrieved for this turn, best first
    pub retrieved: Vec<ScoredChunk>,
    /// Sources of the chunks that made it into the prompt
    pub sources: Vec<String>,
    /// Set when the exchange could not be written to memory
    pub memory_error: Option<MemoryError>,
}

impl SessionReply {
    pub fn answer(&self) -> &str {
        &self.outcome.answer
    }
}

pub struct RagSession {
    id: ConversationId,
    reasoner: Arc<Reasoner>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    memory: ConversationMemory,
    retrieval: RetrievalSettings,
}

impl RagSession {
    /// Fails when the embedder and the index disagree on dimensionality.
    pub fn new(
        reasoner: Arc<Reasoner>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        memory: ConversationMemory,
    ) -> Result<Self> {
        if embedder.dimensions() != store.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: store.dimensions(),
                actual: embedder.dimensions(),
            }
            .into());
        }
        Ok(Self {
            id: ConversationId::new(),
            reasoner,
            store,
            embedder,
            memory,
            retrieval: RetrievalSettings::default(),
        })
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalSettings) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Embed `query` and return the top chunks above `min_score`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        if self.retrieval.top_k == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(query).await?;
        let mut hits = self
            .store
            .search(&embedding, self.retrieval.top_k, self.retrieval.filter.as_ref())
            .await?;
        if let Some(min) = self.retrieval.min_score {
            hits.retain(|h| h.score >= min);
        }
        debug!(conversation = %self.id, hits = hits.len(), "Retrieved context");
        Ok(hits)
    }

    /// What to search for: the user turn itself, or a standalone rewrite of
    /// it when condensing is on and there is history to resolve against. A
    /// failed rewrite falls back to the user turn.
    async fn search_query(&self, user_turn: &str, history: &[MemoryTurn]) -> String {
        if !self.retrieval.condense_question || history.is_empty() {
            return user_turn.to_string();
        }
        match self.reasoner.condense_question(user_turn, history).await {
            Ok(standalone) => standalone,
            Err(e) => {
                warn!(conversation = %self.id, error = %e, "Could not condense question, searching as asked");
                user_turn.to_string()
            }
        }
    }

    /// Answer one user turn.
    pub async fn ask(&mut self, user_turn: &str) -> Result<SessionReply> {
        if user_turn.trim().is_empty() {
            return Err(Error::config("user turn must not be empty"));
        }

        let history = self.memory.get_context(self.reasoner.composer().budget());
        let query = self.search_query(user_turn, &history).await;
        let retrieved = self.retrieve(&query).await?;

        let outcome = self
            .reasoner
            .run(RunInput {
                user_turn,
                retrieved: &retrieved,
                memory: &history,
            })
            .await;

        let mut memory_error = None;
        if outcome.has_answer() {
            let exchange = vec![
                MemoryTurn::user(user_turn),
                MemoryTurn::assistant(outcome.answer.clone()),
            ];
            if let Err(e) = self.memory.append_all(exchange).await {
                warn!(conversation = %self.id, error = %e, "Could not record exchange in memory");
                memory_error = Some(e);
            }
        }

        let mut sources: Vec<String> = Vec::new();
        for citation in &outcome.citations {
            if !sources.contains(&citation.source) {
                sources.push(citation.source.clone());
            }
        }

        info!(
            conversation = %self.id,
            state = outcome.state.as_str(),
            retrieved = retrieved.len(),
            sources = sources.len(),
            memory_turns = self.memory.len(),
            "Turn complete"
        );

        Ok(SessionReply {
            outcome,
            query,
            retrieved,
            sources,
            memory_error,
        })
    }
}
