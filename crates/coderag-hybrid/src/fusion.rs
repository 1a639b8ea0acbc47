//! Reciprocal Rank Fusion of the dense and sparse result lists.
//!
//! `score(c) = sum over lists of 1 / (K + rank + 1)` with 0-based ranks.
//! Chunks are identified by [`ChunkKey`]; the fused order is by descending
//! score, ties kept in order of first appearance.
use std::collections::HashMap;

use coderag_core::config::RetrievalSettings;
use coderag_core::types::{Chunk, ChunkKey, Provenance, RankedResult, SourceKind};

/// One signal's output, best first.
#[derive(Debug, Clone)]
pub struct RankedList {
    pub source: SourceKind,
    pub chunks: Vec<Chunk>,
}

impl RankedList {
    pub fn new(source: SourceKind, chunks: Vec<Chunk>) -> Self {
        Self { source, chunks }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FusionEngine {
    rrf_k: f64,
    identity_prefix_chars: usize,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self { rrf_k: 60.0, identity_prefix_chars: 50 }
    }
}

struct Entry {
    chunk: Chunk,
    score: f64,
    provenance: Provenance,
}

impl FusionEngine {
    pub fn new(rrf_k: f64, identity_prefix_chars: usize) -> Self {
        Self { rrf_k, identity_prefix_chars }
    }

    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self::new(settings.rrf_k, settings.identity_prefix_chars)
    }

    /// Contribution of one appearance at 0-based `rank`.
    pub fn contribution(&self, rank: usize) -> f64 {
        1.0 / (self.rrf_k + rank as f64 + 1.0)
    }

    /// Fuses `lists` and keeps the best `k`. Every appearance contributes,
    /// including repeats within one list.
    pub fn fuse(&self, lists: &[RankedList], k: usize) -> Vec<RankedResult> {
        let mut entries: Vec<Entry> = Vec::new();
        let mut slots: HashMap<ChunkKey, usize> = HashMap::new();

        for list in lists {
            for (rank, chunk) in list.chunks.iter().enumerate() {
                let key = chunk.key(self.identity_prefix_chars);
                let slot = *slots.entry(key).or_insert_with(|| {
                    entries.push(Entry { chunk: chunk.clone(), score: 0.0, provenance: Provenance::default() });
                    entries.len() - 1
                });
                let entry = &mut entries[slot];
                entry.score += self.contribution(rank);
                entry.provenance.record(list.source, rank);
            }
        }

        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        entries.truncate(k);
        entries
            .into_iter()
            .map(|e| RankedResult {
                chunk: e.chunk,
                score: e.score as f32,
                fused_score: e.score as f32,
                provenance: e.provenance,
            })
            .collect()
    }
}
