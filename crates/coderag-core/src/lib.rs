//! coderag-core
//!
//! Data model, error taxonomy and the ingestion half of the retrieval
//! pipeline: language-aware splitting, contextual enrichment and batch chunk
//! preparation. Index backends live in the sibling crates and plug in through
//! the traits in [`traits`].

pub mod config;
pub mod data_processor;
pub mod enrich;
pub mod error;
pub mod language;
pub mod splitter;
pub mod traits;
pub mod types;

pub use config::{Config, RetrievalSettings};
pub use data_processor::{ChunkPreparer, PreparedCorpus};
pub use error::{Error, Result};
pub use traits::{DenseIndex, Embedder, RelevanceScorer, VectorStore};
pub use types::{Chunk, ChunkKey, Document, Provenance, RankedResult, SourceKind};
