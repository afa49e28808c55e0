//! Documents, chunks and their metadata.
//!
//! A [`Document`] is raw text plus scalar metadata, immutable once ingested.
//! The chunker turns it into [`Chunk`]s, which are the unit of retrieval.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use uuid::Uuid;

use crate::error::LoaderError;

/// A scalar metadata value.
///
/// Untagged so that metadata reads naturally in JSON and TOML:
/// `{"topic": "ai", "year": 2024, "draft": false}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    /// Numeric view used by range predicates.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// Ordered metadata map. `BTreeMap` keeps serialization deterministic.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: String,

    /// Where the text came from (path, URL, ...)
    pub source_uri: String,

    /// The full document text
    pub raw_text: String,

    /// Scalar metadata (topic, difficulty, language, ...)
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl Document {
    /// Create a document with a fresh random ID.
    pub fn new(source_uri: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_uri: source_uri.into(),
            raw_text: raw_text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Override the document ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A bounded contiguous span of a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic ID: `{document_id}#{index}`
    pub id: String,

    /// Owning document (back-reference, not ownership)
    pub document_id: String,

    /// Position of this chunk within its document
    pub index: usize,

    /// The chunk text, exactly `raw_text[offset_range]`
    pub text: String,

    /// Byte range into the document's `raw_text`
    pub offset_range: Range<usize>,

    /// Document metadata plus `chunk_index` and `source_uri`
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl Chunk {
    /// Build the canonical chunk ID for a document position.
    pub fn make_id(document_id: &str, index: usize) -> String {
        format!("{document_id}#{index}")
    }

    /// Human-readable source label for citations.
    pub fn source(&self) -> &str {
        self.metadata
            .get("source_uri")
            .and_then(MetadataValue::as_str)
            .unwrap_or(&self.document_id)
    }
}

/// The document loader capability.
///
/// Format-specific parsing lives outside the core; implementations turn a
/// source string (path, URL, ...) into a [`Document`].
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// The loader name (e.g., "text_file", "directory").
    fn name(&self) -> &str;

    /// Load every document reachable from `source`.
    async fn load(&self, source: &str) -> std::result::Result<Vec<Document>, LoaderError>;
}
