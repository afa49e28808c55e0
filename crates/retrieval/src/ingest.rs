//! Ingestion pipeline: documents → chunks → embeddings → index.
//!
//! Each document's chunks are embedded in one batch call; documents are
//! embedded concurrently (bounded by `concurrency`) while preserving order.
//! The index then swaps the old chunks of every ingested document for the
//! new ones under a single write lock, so a failed run changes nothing.

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::info;

use ragent_core::document::{Chunk, Document};
use ragent_core::embedding::Embedder;
use ragent_core::error::{Error, IndexError, ProviderError, Result};
use ragent_core::event::{DomainEvent, EventBus};

use crate::chunker::Chunker;
use crate::index::VectorIndex;

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    /// Chunks removed because their document was ingested again
    pub replaced: usize,
}

pub struct Ingestor {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    concurrency: usize,
    events: Option<Arc<EventBus>>,
}

impl Ingestor {
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Result<Self> {
        if embedder.dimensions() != index.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: index.dimensions(),
                actual: embedder.dimensions(),
            }
            .into());
        }
        Ok(Self {
            chunker,
            embedder,
            index,
            concurrency: 8,
            events: None,
        })
    }

    /// Bound the number of in-flight embedding calls.
    pub fn with_concurrency(mut self, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::config("ingest concurrency must be > 0"));
        }
        self.concurrency = concurrency;
        Ok(self)
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Chunk, embed and index `documents`.
    ///
    /// Embedding failures abort the run before the index is touched.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        let per_document: Vec<Vec<Chunk>> = documents.iter().map(|d| self.chunker.chunk(d)).collect();

        let embedder = &self.embedder;
        let embedded: Vec<Vec<(Chunk, Vec<f32>)>> = stream::iter(per_document)
            .map(|chunks| async move {
                let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
                let vectors = embedder.embed_batch(&texts).await?;
                if vectors.len() != chunks.len() {
                    return Err(Error::Provider(ProviderError::Embedding(format!(
                        "{} returned {} vectors for {} texts",
                        embedder.name(),
                        vectors.len(),
                        chunks.len()
                    ))));
                }
                Ok::<Vec<(Chunk, Vec<f32>)>, Error>(chunks.into_iter().zip(vectors).collect())
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let document_ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        let items = embedded.into_iter().flatten().collect();
        let (replaced, count) = self.index.replace_documents(&document_ids, items).await?;

        let report = IngestReport {
            documents: documents.len(),
            chunks: count,
            replaced,
        };
        info!(
            documents = report.documents,
            chunks = report.chunks,
            replaced = report.replaced,
            "Ingested documents"
        );
        if let Some(events) = &self.events {
            events.publish(DomainEvent::DocumentsIngested {
                documents: report.documents,
                chunks: report.chunks,
                timestamp: Utc::now(),
            });
        }
        Ok(report)
    }
}
