//! `ragent ingest` — load sources, chunk, embed and persist the index.

use std::path::Path;

use anyhow::Context;
use ragent_core::document::Document;
use ragent_retrieval::{Chunker, ChunkerConfig, Ingestor, load_source};
use tracing::info;

pub async fn run(
    config_path: Option<&Path>,
    sources: &[String],
    index: Option<&Path>,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let index_path = super::index_file(&config, index);

    let mut documents: Vec<Document> = Vec::new();
    for source in sources {
        let loaded = load_source(source)
            .await
            .with_context(|| format!("Failed to load {source}"))?;
        info!(source = %source, documents = loaded.len(), "Loaded source");
        documents.extend(loaded);
    }
    if documents.is_empty() {
        println!("⚠️  No text documents found in {}", sources.join(", "));
        return Ok(());
    }

    let index = super::open_or_create_index(&index_path, config.index.dimensions).await?;
    let ingestor = Ingestor::new(
        Chunker::new(ChunkerConfig::from_config(&config.chunking)?),
        super::embedder(&config)?,
        index.clone(),
    )?
    .with_concurrency(config.index.ingest_concurrency)?;

    let report = ingestor.ingest(&documents).await?;
    index.save(&index_path).await?;

    println!(
        "📥 Ingested {} document(s) into {} chunk(s)",
        report.documents, report.chunks
    );
    if report.replaced > 0 {
        println!("   Replaced {} chunk(s) from earlier ingestion", report.replaced);
    }
    println!("   Index: {} ({} chunks)", index_path.display(), index.len().await);
    Ok(())
}
