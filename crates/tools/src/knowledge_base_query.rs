//! Knowledge base query tool — retrieval exposed to the model as a tool.
//!
//! Embeds the query with the configured [`Embedder`] and searches any
//! [`VectorStore`]. Every hit is cited by chunk id, score and source so the
//! model can attribute its answer.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use ragent_core::embedding::Embedder;
use ragent_core::error::ToolError;
use ragent_core::tool::{Tool, ToolResult};
use ragent_core::vector_store::{MetadataFilter, ScoredChunk, VectorStore};

const DEFAULT_TOP_K: usize = 3;

pub struct KnowledgeBaseQueryTool {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl KnowledgeBaseQueryTool {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    fn failed(&self, cause: impl ToString) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            cause: cause.to_string(),
        }
    }
}

/// One cited line per hit: `[n] chunk_id (score 0.87, source): text`.
fn render_hits(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] {} (score {:.2}, {}): {}",
                i + 1,
                hit.chunk.id,
                hit.score,
                hit.chunk.source(),
                hit.chunk.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for KnowledgeBaseQueryTool {
    fn name(&self) -> &str {
        "knowledge_base_query"
    }

    fn description(&self) -> &str {
        "Query the knowledge base for relevant information. Returns document chunks sorted by relevance, \
         each cited with its chunk id, score and source."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to find relevant knowledge"
                },
                "top_k": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 10,
                    "description": "Maximum number of results to return (default 3)"
                },
                "min_score": {
                    "type": "number",
                    "minimum": -1,
                    "maximum": 1,
                    "description": "Drop results scoring below this similarity"
                },
                "source": {
                    "type": "string",
                    "description": "Only search chunks from this source"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    fn output_schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "chunk_id": { "type": "string" },
                    "score": { "type": "number" },
                    "source": { "type": "string" },
                    "text": { "type": "string" }
                },
                "required": ["chunk_id", "score", "source", "text"]
            }
        }))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let top_k = arguments["top_k"]
            .as_u64()
            .map_or(DEFAULT_TOP_K, |k| k as usize);
        let min_score = arguments["min_score"].as_f64().map(|s| s as f32);
        let filter = arguments["source"]
            .as_str()
            .map(|source| MetadataFilter::eq("source_uri", source));

        let embedding = self.embedder.embed(query).await.map_err(|e| self.failed(e))?;
        let mut hits = self
            .store
            .search(&embedding, top_k, filter.as_ref())
            .await
            .map_err(|e| self.failed(e))?;
        if let Some(min) = min_score {
            hits.retain(|h| h.score >= min);
        }
        debug!(query = %query, hits = hits.len(), "Knowledge base query");

        if hits.is_empty() {
            return Ok(ToolResult::ok("No relevant documents found.").with_data(serde_json::json!([])));
        }

        let data: Vec<serde_json::Value> = hits
            .iter()
            .map(|h| {
                serde_json::json!({
                    "chunk_id": h.chunk.id,
                    "score": h.score,
                    "source": h.chunk.source(),
                    "text": h.chunk.text,
                })
            })
            .collect();
        Ok(ToolResult::ok(render_hits(&hits)).with_data(serde_json::Value::Array(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragent_core::document::Document;
    use ragent_core::error::ProviderError;
    use ragent_retrieval::{Chunker, ChunkerConfig, HashingEmbedder, Ingestor, VectorIndex};

    async fn tool_over(docs: Vec<Document>) -> KnowledgeBaseQueryTool {
        let index = Arc::new(VectorIndex::new(256).unwrap());
        let embedder = Arc::new(HashingEmbedder::new(256).unwrap());
        let chunker = Chunker::new(ChunkerConfig::characters(200, 20).unwrap());
        Ingestor::new(chunker, embedder.clone(), index.clone())
            .unwrap()
            .ingest(&docs)
            .await
            .unwrap();
        KnowledgeBaseQueryTool::new(index, embedder)
    }

    #[tokio::test]
    async fn returns_cited_hits() {
        let tool = tool_over(vec![
            Document::new("rust.md", "Rust guarantees memory safety without a garbage collector.")
                .with_id("rust"),
            Document::new("tea.md", "Green tea is brewed at a lower temperature.").with_id("tea"),
        ])
        .await;

        let result = tool
            .execute(serde_json::json!({"query": "memory safety in Rust", "top_k": 1}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.starts_with("[1] rust#0 (score "));
        assert!(result.output.contains("rust.md"));
        let data = result.data.unwrap();
        assert_eq!(data.as_array().unwrap().len(), 1);
        assert_eq!(data[0]["chunk_id"], "rust#0");
    }

    #[tokio::test]
    async fn empty_index_is_not_an_error() {
        let tool = tool_over(vec![]).await;
        let result = tool.execute(serde_json::json!({"query": "anything"})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "No relevant documents found.");
    }

    #[tokio::test]
    async fn source_filter_and_min_score() {
        let tool = tool_over(vec![
            Document::new("a.md", "cats purr").with_id("a"),
            Document::new("b.md", "cats sleep").with_id("b"),
        ])
        .await;
        let result = tool
            .execute(serde_json::json!({"query": "cats", "source": "b.md"}))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap().as_array().unwrap().len(), 1);

        let result = tool
            .execute(serde_json::json!({"query": "cats", "min_score": 0.99}))
            .await
            .unwrap();
        assert_eq!(result.output, "No relevant documents found.");
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        fn name(&self) -> &str {
            "down"
        }
        fn dimensions(&self) -> usize {
            256
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Err(ProviderError::Embedding("offline".into()))
        }
    }

    #[tokio::test]
    async fn embedder_failure_is_execution_failure() {
        let tool = KnowledgeBaseQueryTool::new(
            Arc::new(VectorIndex::new(256).unwrap()),
            Arc::new(DownEmbedder),
        );
        let err = tool.execute(serde_json::json!({"query": "x"})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { ref cause, .. } if cause.contains("offline")));
    }
}
