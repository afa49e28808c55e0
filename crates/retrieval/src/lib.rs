//! # ragent retrieval
//!
//! The build-time half of the RAG pipeline: split documents into
//! overlapping chunks, embed them, and serve exact cosine search over an
//! in-memory index that can be snapshotted to disk.

pub mod chunker;
pub mod embedder;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod similarity;

pub use chunker::{split, ChunkUnit, Chunker, ChunkerConfig};
pub use embedder::HashingEmbedder;
pub use index::{IndexEntry, SearchOptions, VectorIndex, INDEX_FORMAT_VERSION};
pub use ingest::{IngestReport, Ingestor};
pub use loader::{load_source, DirectoryLoader, TextFileLoader};
pub use similarity::cosine_similarity;
