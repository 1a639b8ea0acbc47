//! Batch chunk preparation: validate, split and enrich documents.
//!
//! Documents are independent, so a batch is processed in parallel; output
//! keeps input order and each document's `chunk_index` order. A document that
//! fails validation is skipped and reported, the rest of the batch proceeds.
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::RetrievalSettings;
use crate::enrich::{ChunkEnricher, EnrichConfig};
use crate::error::{Error, Result};
use crate::splitter::{ChunkingConfig, TextSplitter};
use crate::types::{Chunk, Document};

#[derive(Debug)]
pub struct SkippedDocument {
    pub source_path: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct PreparedCorpus {
    pub chunks: Vec<Chunk>,
    pub documents: usize,
    pub skipped: Vec<SkippedDocument>,
}

/// Newline offsets of a text, for byte offset to line number lookups.
struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        Self { newlines: text.match_indices('\n').map(|(i, _)| i).collect() }
    }

    /// 1-based line of the byte at `offset`.
    fn line_of(&self, offset: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < offset) + 1
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkPreparer {
    splitter: TextSplitter,
    enricher: ChunkEnricher,
}

impl ChunkPreparer {
    pub fn new(chunking: ChunkingConfig, enrich: EnrichConfig) -> Self {
        Self { splitter: TextSplitter::new(chunking), enricher: ChunkEnricher::new(enrich) }
    }

    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self::new(
            ChunkingConfig { chunk_size: settings.chunk_size, chunk_overlap: settings.chunk_overlap },
            EnrichConfig {
                header_preview_chars: settings.header_preview_chars,
                header_match_chars: settings.header_match_chars,
            },
        )
    }

    /// Chunks of one document, `chunk_index` in document order.
    pub fn prepare_document(&self, document: &Document) -> Result<Vec<Chunk>> {
        document.validate()?;
        let spans = self.splitter.split_spans(&document.raw_text, &document.language);
        let total_chunks = spans.len();
        let lines = LineIndex::new(&document.raw_text);
        let file_header = self.enricher.file_header(document);

        let chunks = spans
            .into_iter()
            .enumerate()
            .map(|(chunk_index, span)| {
                let original_text = document.raw_text[span.clone()].to_string();
                let leading = original_text.len() - original_text.trim_start_matches('\n').len();
                let body = original_text.trim_end_matches('\n').len().max(leading + 1);
                let start_line = lines.line_of(span.start + leading);
                let end_line = lines.line_of(span.start + body - 1).max(start_line);
                let embedding_text = self.enricher.embedding_text(document, file_header, &original_text);
                Chunk {
                    source_path: document.source_path.clone(),
                    repository: document.repository.clone(),
                    language: document.language.clone(),
                    chunk_index,
                    total_chunks,
                    span,
                    start_line,
                    end_line,
                    original_text,
                    embedding_text,
                }
            })
            .collect();
        Ok(chunks)
    }

    /// Prepares a batch; malformed documents are skipped, never fatal.
    pub fn prepare(&self, documents: &[Document]) -> PreparedCorpus {
        let results: Vec<(&Document, Result<Vec<Chunk>>)> =
            documents.par_iter().map(|doc| (doc, self.prepare_document(doc))).collect();

        let mut corpus = PreparedCorpus::default();
        for (doc, result) in results {
            match result {
                Ok(chunks) => {
                    corpus.documents += 1;
                    corpus.chunks.extend(chunks);
                }
                Err(error) => {
                    warn!(path = %doc.source_path, %error, "skipping document");
                    corpus.skipped.push(SkippedDocument { source_path: doc.source_path.clone(), error });
                }
            }
        }
        info!(
            documents = corpus.documents,
            chunks = corpus.chunks.len(),
            skipped = corpus.skipped.len(),
            "prepared chunks"
        );
        corpus
    }
}
