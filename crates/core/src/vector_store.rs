//! Vector store trait, search results and metadata filters.
//!
//! The concrete in-memory index lives in `ragent-retrieval`; tools and the
//! RAG session only see this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, Metadata, MetadataValue};
use crate::error::IndexError;

/// A chunk paired with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1, 1]`
    pub score: f32,
}

/// A predicate over chunk metadata, applied before ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataFilter {
    /// `metadata[key] == value`
    Eq { key: String, value: MetadataValue },

    /// Numeric `min <= metadata[key] <= max`; open bounds are `None`
    Range {
        key: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },

    /// `metadata[key]` is one of `values`
    In { key: String, values: Vec<MetadataValue> },

    /// All sub-filters match
    And(Vec<MetadataFilter>),
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Self::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn range(key: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self::Range {
            key: key.into(),
            min,
            max,
        }
    }

    /// Does `metadata` satisfy this filter? Missing keys never match.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::Eq { key, value } => metadata.get(key) == Some(value),
            Self::Range { key, min, max } => {
                let Some(n) = metadata.get(key).and_then(MetadataValue::as_f64) else {
                    return false;
                };
                min.is_none_or(|lo| n >= lo) && max.is_none_or(|hi| n <= hi)
            }
            Self::In { key, values } => metadata.get(key).is_some_and(|v| values.contains(v)),
            Self::And(filters) => filters.iter().all(|f| f.matches(metadata)),
        }
    }
}

/// Similarity search over embedded chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Dimensionality every query must have.
    fn dimensions(&self) -> usize;

    /// Number of indexed chunks.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Return up to `k` chunks by descending similarity to `query`.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> std::result::Result<Vec<ScoredChunk>, IndexError>;
}
