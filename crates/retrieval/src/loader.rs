//! Plain-text document loaders.
//!
//! Rich formats (PDF, HTML, ...) are out of scope; these loaders only read
//! UTF-8 `.txt` and `.md` files, one document per file. The document ID is
//! the source path, so re-ingesting a file replaces its chunks instead of
//! duplicating them.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use ragent_core::document::{Document, DocumentLoader};
use ragent_core::error::LoaderError;

/// Extensions treated as plain text.
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Loads a single text file.
#[derive(Debug, Default)]
pub struct TextFileLoader;

impl TextFileLoader {
    async fn load_path(&self, path: &Path) -> Result<Document, LoaderError> {
        if !is_text_file(path) {
            return Err(LoaderError::Unsupported(path.display().to_string()));
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LoaderError::Read {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let source = path.display().to_string();
        let mut doc = Document::new(source.clone(), text).with_id(source);
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            doc = doc.with_metadata("file_name", name);
        }
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            doc = doc.with_metadata("extension", ext.to_ascii_lowercase());
        }
        debug!(path = %path.display(), bytes = doc.raw_text.len(), "Loaded document");
        Ok(doc)
    }
}

#[async_trait]
impl DocumentLoader for TextFileLoader {
    fn name(&self) -> &str {
        "text_file"
    }

    async fn load(&self, source: &str) -> Result<Vec<Document>, LoaderError> {
        Ok(vec![self.load_path(Path::new(source)).await?])
    }
}

/// Recursively loads every text file under a directory, sorted by path.
#[derive(Debug, Default)]
pub struct DirectoryLoader {
    follow_links: bool,
}

impl DirectoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    fn collect_paths(&self, root: &Path) -> Result<Vec<PathBuf>, LoaderError> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(root).follow_links(self.follow_links) {
            let entry = entry.map_err(|e| LoaderError::Read {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;
            if entry.file_type().is_file() && is_text_file(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        // Sort for deterministic ordering
        paths.sort();
        Ok(paths)
    }
}

#[async_trait]
impl DocumentLoader for DirectoryLoader {
    fn name(&self) -> &str {
        "directory"
    }

    async fn load(&self, source: &str) -> Result<Vec<Document>, LoaderError> {
        let root = Path::new(source);
        if !root.is_dir() {
            return Err(LoaderError::Unsupported(format!("not a directory: {source}")));
        }

        let file_loader = TextFileLoader;
        let mut documents = Vec::new();
        for path in self.collect_paths(root)? {
            match file_loader.load_path(&path).await {
                Ok(doc) => documents.push(doc),
                // Non-UTF-8 files are skipped, not fatal
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable file"),
            }
        }
        Ok(documents)
    }
}

/// Pick a loader for `source`: directories walk, files load directly.
pub async fn load_source(source: &str) -> Result<Vec<Document>, LoaderError> {
    if Path::new(source).is_dir() {
        DirectoryLoader::new().load(source).await
    } else {
        TextFileLoader.load(source).await
    }
}
