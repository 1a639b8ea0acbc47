//! coderag-text
//!
//! Keyword retrieval signal: an in-RAM Tantivy BM25 index over enriched chunk
//! text, tokenized for source code (lower-cased, stop words removed, very long
//! tokens dropped).
pub mod tantivy_utils;
pub mod index;

pub use index::SparseIndex;
