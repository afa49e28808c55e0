//! Embedder trait — the abstraction over embedding models.
//!
//! The core never computes embeddings itself; it only requires that
//! identical text yields (near-)identical vectors of a fixed length.

use async_trait::async_trait;
use crate::error::ProviderError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// A human-readable name (e.g., "hashing", "text-embedding-3-small").
    fn name(&self) -> &str;

    /// Length of every vector this embedder produces.
    fn dimensions(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError>;

    /// Embed several texts, preserving order.
    ///
    /// Default implementation embeds one text at a time.
    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
