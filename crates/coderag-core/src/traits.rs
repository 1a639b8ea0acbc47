//! Seams between the pipeline and its model and storage backends.
use std::future::Future;

use crate::error::Result;
use crate::types::Chunk;

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Semantic lookup over one built snapshot.
pub trait DenseIndex: Send + Sync {
    /// Up to `k` chunks, most relevant first.
    fn search(&self, query: &str, k: usize) -> impl Future<Output = Result<Vec<Chunk>>> + Send;
}

/// Storage that builds and opens named dense snapshots.
pub trait VectorStore: Send + Sync {
    type Index: DenseIndex + 'static;

    /// Replaces the snapshot's contents with `chunks`; returns rows written.
    fn write_snapshot(&self, snapshot: &str, chunks: &[Chunk]) -> impl Future<Output = Result<usize>> + Send;

    /// Fails with `Error::NotFound` when the snapshot was never built.
    fn open(&self, snapshot: &str) -> impl Future<Output = Result<Self::Index>> + Send;

    /// Every chunk of the snapshot, ordered by repository, path and index.
    fn load_chunks(&self, snapshot: &str) -> impl Future<Output = Result<Vec<Chunk>>> + Send;

    fn drop_snapshot(&self, snapshot: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Cross-encoder style scorer of `(query, document)` pairs.
pub trait RelevanceScorer: Send + Sync {
    fn model_id(&self) -> &str;
    /// One score per document, same order; higher is more relevant.
    fn score(&self, query: &str, documents: &[&str]) -> anyhow::Result<Vec<f32>>;
}
