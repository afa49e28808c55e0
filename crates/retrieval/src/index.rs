//! In-memory vector index with exact cosine search.
//!
//! Entries are kept in insertion order behind a `tokio::sync::RwLock`:
//! many concurrent searches, one writer at a time. Search is brute force
//! over every candidate that passes the metadata filter, sorted with a
//! stable sort so equal scores keep insertion order.
//!
//! The index can be snapshotted to a JSON file and loaded back; a snapshot
//! written by an incompatible format version is rejected, never coerced.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

use ragent_core::document::Chunk;
use ragent_core::error::IndexError;
use ragent_core::vector_store::{MetadataFilter, ScoredChunk, VectorStore};

use crate::similarity::cosine_similarity;

/// Snapshot format written by [`VectorIndex::save`].
pub const INDEX_FORMAT_VERSION: u32 = 1;

const METRIC_COSINE: &str = "cosine";

/// A chunk, its embedding, and its insertion sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub seq: u64,
}

/// Query-time search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub k: usize,
    pub filter: Option<MetadataFilter>,
    /// Results scoring below this are dropped
    pub min_score: Option<f32>,
}

impl SearchOptions {
    pub fn top_k(k: usize) -> Self {
        Self {
            k,
            filter: None,
            min_score: None,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

#[derive(Debug, Default)]
struct IndexState {
    entries: Vec<IndexEntry>,
    ids: HashSet<String>,
    next_seq: u64,
}

impl IndexState {
    /// Reject ids already indexed (unless their document is in `replacing`)
    /// or repeated within `items`.
    fn check_new_ids(&self, items: &[(Chunk, Vec<f32>)], replacing: &HashSet<&str>) -> Result<(), IndexError> {
        let freed: HashSet<&str> = self
            .entries
            .iter()
            .filter(|e| replacing.contains(e.chunk.document_id.as_str()))
            .map(|e| e.chunk.id.as_str())
            .collect();
        let mut batch_ids = HashSet::new();
        for (chunk, _) in items {
            let taken = self.ids.contains(&chunk.id) && !freed.contains(chunk.id.as_str());
            if taken || !batch_ids.insert(chunk.id.as_str()) {
                return Err(IndexError::DuplicateChunk(chunk.id.clone()));
            }
        }
        Ok(())
    }

    fn remove_documents(&mut self, document_ids: &HashSet<&str>) -> usize {
        let before = self.entries.len();
        let Self { entries, ids, .. } = self;
        entries.retain(|e| {
            let keep = !document_ids.contains(e.chunk.document_id.as_str());
            if !keep {
                ids.remove(&e.chunk.id);
            }
            keep
        });
        before - self.entries.len()
    }

    fn push(&mut self, chunk: Chunk, embedding: Vec<f32>) {
        self.ids.insert(chunk.id.clone());
        self.entries.push(IndexEntry {
            chunk,
            embedding,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }
}

#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    format_version: u32,
    dimensions: usize,
    metric: String,
    entries: Vec<IndexEntry>,
}

/// Only the version tag, read before trusting the rest of the file.
#[derive(Deserialize)]
struct SnapshotHeader {
    format_version: u32,
}

#[derive(Debug)]
pub struct VectorIndex {
    dimensions: usize,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Create an empty index. Dimensionality is fixed from here on.
    pub fn new(dimensions: usize) -> Result<Self, IndexError> {
        if dimensions == 0 {
            return Err(IndexError::InvalidConfig(
                "index dimensions must be > 0".into(),
            ));
        }
        Ok(Self {
            dimensions,
            state: RwLock::new(IndexState::default()),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    /// Insert one chunk with its embedding.
    pub async fn insert(&self, chunk: Chunk, embedding: Vec<f32>) -> Result<(), IndexError> {
        self.check_dimensions(&embedding)?;
        let mut state = self.state.write().await;
        if state.ids.contains(&chunk.id) {
            return Err(IndexError::DuplicateChunk(chunk.id));
        }
        debug!(chunk_id = %chunk.id, "Indexed chunk");
        state.push(chunk, embedding);
        Ok(())
    }

    /// Insert many entries under one write lock, in order.
    ///
    /// All-or-nothing: every entry is checked before any is inserted.
    pub async fn insert_batch(&self, items: Vec<(Chunk, Vec<f32>)>) -> Result<usize, IndexError> {
        for (_, embedding) in &items {
            self.check_dimensions(embedding)?;
        }
        let mut state = self.state.write().await;
        state.check_new_ids(&items, &HashSet::new())?;
        let count = items.len();
        for (chunk, embedding) in items {
            state.push(chunk, embedding);
        }
        debug!(count, "Indexed chunk batch");
        Ok(count)
    }

    /// Swap every chunk of `document_ids` for `items` under one write lock.
    ///
    /// Validated up front like [`insert_batch`](Self::insert_batch); on error
    /// the index is unchanged and readers never observe a half-replaced
    /// document. Returns `(removed, inserted)`.
    pub async fn replace_documents(
        &self,
        document_ids: &[&str],
        items: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<(usize, usize), IndexError> {
        for (_, embedding) in &items {
            self.check_dimensions(embedding)?;
        }
        let replacing: HashSet<&str> = document_ids.iter().copied().collect();
        let mut state = self.state.write().await;
        state.check_new_ids(&items, &replacing)?;

        let removed = state.remove_documents(&replacing);
        let inserted = items.len();
        for (chunk, embedding) in items {
            state.push(chunk, embedding);
        }
        debug!(removed, inserted, "Replaced documents");
        Ok((removed, inserted))
    }

    /// Look up a chunk by ID.
    pub async fn get(&self, chunk_id: &str) -> Option<Chunk> {
        let state = self.state.read().await;
        state
            .entries
            .iter()
            .find(|e| e.chunk.id == chunk_id)
            .map(|e| e.chunk.clone())
    }

    /// Remove every chunk of a document. Returns how many were removed.
    pub async fn remove_document(&self, document_id: &str) -> usize {
        let mut state = self.state.write().await;
        state.remove_documents(&HashSet::from([document_id]))
    }

    /// Top-`k` chunks by descending cosine similarity.
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        self.check_dimensions(query)?;
        let state = self.state.read().await;
        Ok(rank(&state.entries, query, k, filter, None))
    }

    /// Search with the full set of options.
    pub async fn search_with(
        &self,
        query: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        self.check_dimensions(query)?;
        let state = self.state.read().await;
        Ok(rank(
            &state.entries,
            query,
            options.k,
            options.filter.as_ref(),
            options.min_score,
        ))
    }

    /// Write a JSON snapshot to `path`, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<(), IndexError> {
        let snapshot = {
            let state = self.state.read().await;
            IndexSnapshot {
                format_version: INDEX_FORMAT_VERSION,
                dimensions: self.dimensions,
                metric: METRIC_COSINE.into(),
                entries: state.entries.clone(),
            }
        };
        let json = serde_json::to_vec(&snapshot).map_err(|e| IndexError::Storage(e.to_string()))?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IndexError::Storage(format!("{}: {e}", parent.display())))?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| IndexError::Storage(format!("{}: {e}", path.display())))?;

        info!(path = %path.display(), entries = snapshot.entries.len(), "Saved index");
        Ok(())
    }

    /// Load a snapshot written by [`save`](Self::save).
    pub async fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IndexError::Storage(format!("{}: {e}", path.display())))?;

        let header: SnapshotHeader = serde_json::from_slice(&bytes)
            .map_err(|e| IndexError::Storage(format!("{}: {e}", path.display())))?;
        if header.format_version != INDEX_FORMAT_VERSION {
            return Err(IndexError::IncompatibleIndexVersion {
                path: path.to_path_buf(),
                expected: INDEX_FORMAT_VERSION,
                found: header.format_version,
            });
        }

        let snapshot: IndexSnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| IndexError::Storage(format!("{}: {e}", path.display())))?;
        if snapshot.metric != METRIC_COSINE {
            return Err(IndexError::InvalidConfig(format!(
                "unsupported metric '{}'",
                snapshot.metric
            )));
        }

        let index = Self::new(snapshot.dimensions)?;
        {
            let mut state = index.state.write().await;
            for entry in snapshot.entries {
                index.check_dimensions(&entry.embedding)?;
                if state.ids.contains(&entry.chunk.id) {
                    return Err(IndexError::DuplicateChunk(entry.chunk.id));
                }
                state.push(entry.chunk, entry.embedding);
            }
        }

        info!(path = %path.display(), entries = index.len().await, "Loaded index");
        Ok(index)
    }
}

/// Filter, score, stable-sort and truncate.
fn rank(
    entries: &[IndexEntry],
    query: &[f32],
    k: usize,
    filter: Option<&MetadataFilter>,
    min_score: Option<f32>,
) -> Vec<ScoredChunk> {
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(f32, &IndexEntry)> = entries
        .iter()
        .filter(|e| filter.is_none_or(|f| f.matches(&e.chunk.metadata)))
        .map(|e| (cosine_similarity(&e.embedding, query), e))
        // NaN would outrank every real score under total_cmp.
        .filter(|(score, _)| score.is_finite())
        .filter(|(score, _)| min_score.is_none_or(|min| *score >= min))
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(k);
    scored
        .into_iter()
        .map(|(score, e)| ScoredChunk {
            chunk: e.chunk.clone(),
            score,
        })
        .collect()
}

#[async_trait]
impl VectorStore for VectorIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn len(&self) -> usize {
        VectorIndex::len(self).await
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        VectorIndex::search(self, query, k, filter).await
    }
}
