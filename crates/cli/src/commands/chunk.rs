//! `ragent chunk` — split a file and show the result.

use std::path::Path;

use anyhow::Context;
use ragent_config::ChunkingConfig;
use ragent_core::document::{Chunk, DocumentLoader};
use ragent_retrieval::{Chunker, ChunkerConfig, TextFileLoader};

pub async fn run(
    config_path: Option<&Path>,
    file: &Path,
    max_size: Option<usize>,
    overlap: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let chunking = ChunkingConfig {
        max_size: max_size.unwrap_or(config.chunking.max_size),
        overlap: overlap.unwrap_or(config.chunking.overlap),
        unit: config.chunking.unit,
    };
    let chunker = Chunker::new(ChunkerConfig::from_config(&chunking)?);

    let source = file.to_string_lossy();
    let documents = TextFileLoader
        .load(&source)
        .await
        .with_context(|| format!("Failed to load {source}"))?;

    let chunks: Vec<Chunk> = documents.iter().flat_map(|d| chunker.chunk(d)).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    println!(
        "✂️  {} chunk(s) from {source} (max_size {}, overlap {})",
        chunks.len(),
        chunking.max_size,
        chunking.overlap
    );
    for chunk in &chunks {
        println!(
            "  {:<24} bytes {:>6}..{:<6} {}",
            chunk.id,
            chunk.offset_range.start,
            chunk.offset_range.end,
            super::preview(&chunk.text, 60)
        );
    }
    Ok(())
}
