//! Deterministic feature-hashing embedder.
//!
//! Maps each lowercased alphanumeric word to a bucket via SHA-256 and counts
//! occurrences, then L2-normalizes. No model, no network: identical text
//! always yields the identical vector, and texts sharing words score high
//! under cosine similarity. Good enough for tests, demos and offline use;
//! real deployments plug a model-backed [`Embedder`] in instead.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use ragent_core::embedding::Embedder;
use ragent_core::error::{Error, ProviderError, Result};

use crate::similarity::normalize;

pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::config("embedding dimensions must be > 0"));
        }
        Ok(Self { dimensions })
    }

    fn bucket(&self, word: &str) -> usize {
        let digest = Sha256::digest(word.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(bytes) % self.dimensions as u64) as usize
    }

    /// Synchronous embedding, shared by `embed` and tests.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for word in words(text) {
            v[self.bucket(&word)] += 1.0;
        }
        normalize(&mut v);
        v
    }
}

/// Lowercased alphanumeric words.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        Ok(self.embed_text(text))
    }
}
