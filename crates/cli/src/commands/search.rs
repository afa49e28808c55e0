//! `ragent search` — query the index from the command line.

use std::path::Path;

use ragent_core::embedding::Embedder;
use ragent_core::vector_store::MetadataFilter;
use ragent_retrieval::SearchOptions;

pub struct SearchArgs {
    pub top_k: Option<usize>,
    pub source: Option<String>,
    pub min_score: Option<f32>,
}

pub async fn run(
    config_path: Option<&Path>,
    query: &str,
    args: SearchArgs,
    index: Option<&Path>,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let index = super::open_index(&super::index_file(&config, index)).await?;
    let embedder = super::embedder(&config)?;

    let mut options = SearchOptions::top_k(args.top_k.unwrap_or(config.retrieval.top_k));
    if let Some(source) = args.source {
        options = options.with_filter(MetadataFilter::eq("source_uri", source));
    }
    if let Some(min) = args.min_score.or(config.retrieval.min_score) {
        options = options.with_min_score(min);
    }

    let query_vec = embedder.embed(query).await?;
    let hits = index.search_with(&query_vec, &options).await?;

    println!("🔍 Searching {} chunk(s) for: \"{query}\"", index.len().await);
    println!();
    if hits.is_empty() {
        println!("   No matching chunks.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "  {:>2}. [score: {:.3}] {} ({})",
            i + 1,
            hit.score,
            hit.chunk.id,
            hit.chunk.source()
        );
        println!("      {}", super::preview(&hit.chunk.text, 80));
    }
    Ok(())
}
