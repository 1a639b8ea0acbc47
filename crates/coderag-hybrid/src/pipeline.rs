//! `ingest` builds a named snapshot; `retrieve` answers one query against it.
use std::sync::Arc;
use tracing::{debug, info, warn};

use coderag_core::config::RetrievalSettings;
use coderag_core::data_processor::{ChunkPreparer, SkippedDocument};
use coderag_core::error::{Error, Result};
use coderag_core::traits::{DenseIndex, VectorStore};
use coderag_core::types::{Document, RankedResult, SourceKind};
use coderag_text::SparseIndex;

use crate::fusion::{FusionEngine, RankedList};
use crate::registry::{Snapshot, SnapshotRegistry};
use crate::rerank::Reranker;

/// Stages a query passes through, in order. Only the re-rank step branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Received,
    DenseSearched,
    SparseSearched,
    Fused,
    Reranked,
    RerankSkipped,
    Returned,
}

#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub results: Vec<RankedResult>,
    /// True when the cross-encoder ordered `results`; false when they are the
    /// head of the fused list.
    pub reranked: bool,
    pub trace: Vec<QueryStage>,
}

impl RetrievalOutcome {
    /// Distinct `repo/path` labels of the results, in result order.
    pub fn sources(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for r in &self.results {
            let label = r.chunk.source_label();
            if !out.contains(&label) {
                out.push(label);
            }
        }
        out
    }
}

#[derive(Debug)]
pub struct IngestReport {
    pub snapshot: String,
    pub documents: usize,
    pub chunks: usize,
    pub skipped: Vec<SkippedDocument>,
}

pub struct Retriever<S: VectorStore> {
    store: S,
    settings: RetrievalSettings,
    preparer: ChunkPreparer,
    fusion: FusionEngine,
    reranker: Reranker,
    registry: SnapshotRegistry<S::Index>,
}

impl<S: VectorStore> Retriever<S> {
    /// Validates `settings`; the re-ranker uses the process-wide model cache.
    pub fn new(store: S, settings: RetrievalSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            preparer: ChunkPreparer::from_settings(&settings),
            fusion: FusionEngine::from_settings(&settings),
            reranker: Reranker::from_settings(&settings),
            registry: SnapshotRegistry::new(),
            store,
            settings,
        })
    }

    #[must_use]
    pub fn with_reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &SnapshotRegistry<S::Index> {
        &self.registry
    }

    /// Splits, enriches and indexes `documents` as snapshot `name`, replacing
    /// any previous contents. Malformed documents are skipped and reported.
    pub async fn ingest(&self, name: &str, documents: &[Document]) -> Result<IngestReport> {
        let corpus = self.preparer.prepare(documents);
        let chunks = corpus.chunks;
        if chunks.is_empty() {
            warn!(snapshot = name, "no chunks to index, snapshot retired");
            self.drop_snapshot(name).await?;
            return Ok(IngestReport { snapshot: name.to_string(), documents: corpus.documents, chunks: 0, skipped: corpus.skipped });
        }

        self.store.write_snapshot(name, &chunks).await?;
        let dense = self.store.open(name).await?;
        let chunk_count = chunks.len();
        let sparse = SparseIndex::build(chunks)?;
        self.registry.publish(Snapshot { name: name.to_string(), dense, sparse, chunk_count });
        info!(snapshot = name, documents = corpus.documents, chunks = chunk_count, skipped = corpus.skipped.len(), "snapshot published");

        Ok(IngestReport { snapshot: name.to_string(), documents: corpus.documents, chunks: chunk_count, skipped: corpus.skipped })
    }

    /// The published snapshot, loading it from the store on first use.
    pub async fn session(&self, name: &str) -> Result<Arc<Snapshot<S::Index>>> {
        if let Some(snapshot) = self.registry.get(name) {
            return Ok(snapshot);
        }
        let dense = self.store.open(name).await?;
        let chunks = self.store.load_chunks(name).await?;
        let chunk_count = chunks.len();
        let sparse = SparseIndex::build(chunks)?;
        info!(snapshot = name, chunks = chunk_count, "snapshot loaded");
        Ok(self.registry.publish_if_absent(Snapshot { name: name.to_string(), dense, sparse, chunk_count }))
    }

    pub async fn drop_snapshot(&self, name: &str) -> Result<()> {
        self.registry.retire(name);
        self.store.drop_snapshot(name).await
    }

    /// Ranked fragments for `query` from snapshot `name`.
    ///
    /// Fails with `NotFound` when the snapshot was never built and with
    /// `NoMatches` when neither signal returns anything.
    pub async fn retrieve(&self, query: &str, name: &str) -> Result<RetrievalOutcome> {
        let mut trace = vec![QueryStage::Received];
        let snapshot = self.session(name).await?;

        let (dense, sparse) = tokio::join!(
            snapshot.dense.search(query, self.settings.dense_k),
            async { snapshot.sparse.search(query, self.settings.sparse_k) },
        );
        let dense = dense?;
        trace.push(QueryStage::DenseSearched);
        let sparse = sparse?;
        trace.push(QueryStage::SparseSearched);
        debug!(snapshot = name, dense = dense.len(), sparse = sparse.len(), "signals returned");

        let lists = [RankedList::new(SourceKind::Dense, dense), RankedList::new(SourceKind::Sparse, sparse)];
        let fused = self.fusion.fuse(&lists, self.settings.fusion_k);
        trace.push(QueryStage::Fused);
        if fused.is_empty() {
            return Err(Error::NoMatches(query.to_string()));
        }

        let outcome = self.reranker.rerank(query, fused);
        trace.push(if outcome.reranked { QueryStage::Reranked } else { QueryStage::RerankSkipped });
        trace.push(QueryStage::Returned);
        debug!(snapshot = name, results = outcome.results.len(), reranked = outcome.reranked, "query answered");

        Ok(RetrievalOutcome { results: outcome.results, reranked: outcome.reranked, trace })
    }
}
