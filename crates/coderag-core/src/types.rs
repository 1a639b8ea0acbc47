//! Domain types shared by the splitter, the indices and the fusion pipeline.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{Error, Result};
use crate::language::language_for_path;

pub type ChunkId = String;

/// A whole source file handed over by the ingestion collaborator.
///
/// - `source_path`: repo-relative, forward-slash normalized
/// - `repository`: label when several codebases share one snapshot
/// - `language`: derived from the extension unless overridden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub source_path: String,
    pub repository: Option<String>,
    pub language: String,
    pub raw_text: String,
}

impl Document {
    pub fn new(source_path: impl AsRef<str>, raw_text: impl Into<String>) -> Self {
        let source_path = normalize_source_path(source_path.as_ref());
        let language = language_for_path(&source_path).to_string();
        Self { source_path, repository: None, language, raw_text: raw_text.into() }
    }

    #[must_use]
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Rejects documents the splitter must never see.
    pub fn validate(&self) -> Result<()> {
        if self.source_path.is_empty() {
            return Err(Error::MalformedDocument { path: String::new(), reason: "missing source path".into() });
        }
        if self.raw_text.trim().is_empty() {
            return Err(Error::MalformedDocument {
                path: self.source_path.clone(),
                reason: "empty or whitespace-only content".into(),
            });
        }
        Ok(())
    }
}

/// Backslashes become forward slashes and a leading `./` is dropped.
pub fn normalize_source_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    normalized.trim_start_matches("./").to_string()
}

/// A contiguous slice of a [`Document`], indexed by both retrieval signals.
///
/// `original_text` is the verbatim slice shown to humans and handed to the
/// LLM; `embedding_text` carries the contextual header and is what the
/// indices see. `span` holds byte offsets into the parent's `raw_text`,
/// `start_line`/`end_line` are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_path: String,
    pub repository: Option<String>,
    pub language: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub span: Range<usize>,
    pub start_line: usize,
    pub end_line: usize,
    pub original_text: String,
    pub embedding_text: String,
}

impl Chunk {
    /// Primary key used by the physical indices.
    pub fn id(&self) -> ChunkId {
        match &self.repository {
            Some(repo) => format!("{repo}/{}#{}", self.source_path, self.chunk_index),
            None => format!("{}#{}", self.source_path, self.chunk_index),
        }
    }

    pub fn key(&self, prefix_chars: usize) -> ChunkKey {
        ChunkKey::new(self, prefix_chars)
    }

    /// Header line for presenting the chunk, e.g.
    /// `src/auth.py (chunk 2/3) [backend] [python]`.
    pub fn display_label(&self) -> String {
        let repo = self.repository.as_deref().map(|r| format!(" [{r}]")).unwrap_or_default();
        format!(
            "{} (chunk {}/{}){} [{}]",
            self.source_path,
            self.chunk_index + 1,
            self.total_chunks,
            repo,
            self.language
        )
    }

    /// `repo/path` when a repository label is present, otherwise the path.
    pub fn source_label(&self) -> String {
        match &self.repository {
            Some(repo) => format!("{repo}/{}", self.source_path),
            None => self.source_path.clone(),
        }
    }
}

/// Identity of a chunk for deduplication across ranked lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub source_path: String,
    pub chunk_index: usize,
    pub prefix: String,
}

impl ChunkKey {
    pub fn new(chunk: &Chunk, prefix_chars: usize) -> Self {
        Self {
            source_path: chunk.source_path.clone(),
            chunk_index: chunk.chunk_index,
            prefix: chunk.original_text.chars().take(prefix_chars).collect(),
        }
    }
}

/// Indicates which retrieval signal produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Dense,
    Sparse,
}

/// 0-based rank a result held in each signal's list, if it appeared there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub dense_rank: Option<usize>,
    pub sparse_rank: Option<usize>,
}

impl Provenance {
    pub fn rank(&self, source: SourceKind) -> Option<usize> {
        match source {
            SourceKind::Dense => self.dense_rank,
            SourceKind::Sparse => self.sparse_rank,
        }
    }

    /// Keeps the best (lowest) rank when a chunk repeats within one list.
    pub fn record(&mut self, source: SourceKind, rank: usize) {
        let slot = match source {
            SourceKind::Dense => &mut self.dense_rank,
            SourceKind::Sparse => &mut self.sparse_rank,
        };
        *slot = Some(slot.map_or(rank, |r| r.min(rank)));
    }

    pub fn sources(&self) -> Vec<SourceKind> {
        [SourceKind::Dense, SourceKind::Sparse].into_iter().filter(|s| self.rank(*s).is_some()).collect()
    }
}

/// A chunk scored for one query.
///
/// `score` starts as the fusion score and is replaced by the re-ranker score
/// when re-ranking ran; `fused_score` always keeps the fusion score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub chunk: Chunk,
    pub score: f32,
    pub fused_score: f32,
    pub provenance: Provenance,
}
