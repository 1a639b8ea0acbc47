//! Brute-force in-process vector store with the same snapshot and MMR
//! semantics as the LanceDB store. Suited to tests and small corpora.
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use coderag_core::error::{Error, Result};
use coderag_core::traits::{DenseIndex, Embedder, VectorStore};
use coderag_core::types::Chunk;

use crate::lance::{embed_query, validate_snapshot_name};
use crate::mmr::{cosine_similarity, mmr_select, MmrParams};

type Rows = Arc<Vec<(Chunk, Vec<f32>)>>;

pub struct MemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    params: MmrParams,
    snapshots: RwLock<HashMap<String, Rows>>,
}

impl MemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>, params: MmrParams) -> Self {
        Self { embedder, params, snapshots: RwLock::new(HashMap::new()) }
    }

    fn rows(&self, snapshot: &str) -> Result<Rows> {
        validate_snapshot_name(snapshot)?;
        match self.snapshots.read().get(snapshot) {
            Some(rows) if !rows.is_empty() => Ok(rows.clone()),
            Some(_) => Err(Error::NotFound(format!("snapshot '{snapshot}' is empty"))),
            None => Err(Error::NotFound(format!("snapshot '{snapshot}' has not been built"))),
        }
    }
}

impl VectorStore for MemoryVectorStore {
    type Index = MemoryDenseIndex;

    async fn write_snapshot(&self, snapshot: &str, chunks: &[Chunk]) -> Result<usize> {
        validate_snapshot_name(snapshot)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.embedding_text.clone()).collect();
        let vectors = if texts.is_empty() { Vec::new() } else { self.embedder.embed_batch(&texts)? };
        if vectors.len() != chunks.len() {
            return Err(Error::Operation(format!("{} chunks but {} vectors", chunks.len(), vectors.len())));
        }
        let rows: Vec<(Chunk, Vec<f32>)> = chunks.iter().cloned().zip(vectors).collect();
        let written = rows.len();
        self.snapshots.write().insert(snapshot.to_string(), Arc::new(rows));
        Ok(written)
    }

    async fn open(&self, snapshot: &str) -> Result<MemoryDenseIndex> {
        Ok(MemoryDenseIndex { rows: self.rows(snapshot)?, embedder: self.embedder.clone(), params: self.params })
    }

    async fn load_chunks(&self, snapshot: &str) -> Result<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self.rows(snapshot)?.iter().map(|(c, _)| c.clone()).collect();
        chunks.sort_by(|a, b| {
            (&a.repository, &a.source_path, a.chunk_index).cmp(&(&b.repository, &b.source_path, b.chunk_index))
        });
        Ok(chunks)
    }

    async fn drop_snapshot(&self, snapshot: &str) -> Result<()> {
        validate_snapshot_name(snapshot)?;
        self.snapshots.write().remove(snapshot);
        Ok(())
    }
}

pub struct MemoryDenseIndex {
    rows: Rows,
    embedder: Arc<dyn Embedder>,
    params: MmrParams,
}

impl DenseIndex for MemoryDenseIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(self.embedder.as_ref(), query)?;
        let mut nearest: Vec<(f32, usize)> =
            self.rows.iter().enumerate().map(|(i, (_, v))| (cosine_similarity(&query_vec, v), i)).collect();
        nearest.sort_by(|a, b| b.0.total_cmp(&a.0));
        nearest.truncate(self.params.fetch_k.max(k));

        let vectors: Vec<Vec<f32>> = nearest.iter().map(|&(_, i)| self.rows[i].1.clone()).collect();
        let picks = mmr_select(&query_vec, &vectors, k, self.params.lambda);
        Ok(picks.into_iter().map(|p| self.rows[nearest[p].1].0.clone()).collect())
    }
}
