//! Subcommand implementations and the setup they share.

pub mod chunk;
pub mod config_cmd;
pub mod ingest;
pub mod search;
pub mod tools;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ragent_config::AppConfig;
use ragent_retrieval::{HashingEmbedder, VectorIndex};

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = config_file(path);
    AppConfig::load_with_env(&path).with_context(|| format!("Failed to load config from {}", path.display()))
}

pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn index_file(config: &AppConfig, index: Option<&Path>) -> PathBuf {
    index.map(Path::to_path_buf).unwrap_or_else(|| config.index_path())
}

pub fn embedder(config: &AppConfig) -> anyhow::Result<Arc<HashingEmbedder>> {
    Ok(Arc::new(HashingEmbedder::new(config.index.dimensions)?))
}

/// Open an existing snapshot.
pub async fn open_index(path: &Path) -> anyhow::Result<Arc<VectorIndex>> {
    if !path.exists() {
        anyhow::bail!(
            "No index at {}. Run `ragent ingest <path>` first.",
            path.display()
        );
    }
    let index = VectorIndex::load(path)
        .await
        .with_context(|| format!("Failed to open index {}", path.display()))?;
    Ok(Arc::new(index))
}

/// Open the snapshot at `path`, or start an empty index.
pub async fn open_or_create_index(path: &Path, dimensions: usize) -> anyhow::Result<Arc<VectorIndex>> {
    if path.exists() {
        open_index(path).await
    } else {
        Ok(Arc::new(VectorIndex::new(dimensions)?))
    }
}

/// First line of `text`, cut to `max` characters.
pub fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    let mut out: String = line.chars().take(max).collect();
    if line.chars().count() > max || text.lines().nth(1).is_some() {
        out.push('…');
    }
    out
}
