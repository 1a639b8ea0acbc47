//! Dense snapshots stored as LanceDB tables, searched with MMR.
use anyhow::anyhow;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::sync::Arc;
use tracing::debug;

use coderag_core::config::RetrievalSettings;
use coderag_core::error::{Error, Result};
use coderag_core::traits::{DenseIndex, Embedder, VectorStore};
use coderag_core::types::Chunk;

use crate::mmr::{mmr_select, MmrParams};
use crate::table::{open_db, record_batch_to_rows, table_exists};
use crate::writer::LanceChunkWriter;

/// Snapshot names double as table names.
pub fn validate_snapshot_name(snapshot: &str) -> Result<()> {
    let ok = !snapshot.is_empty()
        && snapshot.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("invalid snapshot name '{snapshot}'")))
    }
}

pub(crate) fn embed_query(embedder: &dyn Embedder, query: &str) -> Result<Vec<f32>> {
    embedder
        .embed_batch(&[query.to_string()])?
        .pop()
        .ok_or_else(|| Error::Operation("embedder returned no vector for the query".into()))
}

#[derive(Clone)]
pub struct LanceStore {
    db: Connection,
    embedder: Arc<dyn Embedder>,
    params: MmrParams,
}

impl LanceStore {
    pub fn new(db: Connection, embedder: Arc<dyn Embedder>, params: MmrParams) -> Self {
        Self { db, embedder, params }
    }

    /// Opens the database at `uri` with the default embedder for `settings`.
    pub async fn connect(uri: &str, settings: &RetrievalSettings) -> Result<Self> {
        let db = open_db(uri).await?;
        let root = settings.model_root();
        let embedder = coderag_embed::get_default_embedder(root.as_deref())?;
        Ok(Self::new(db, embedder, MmrParams::from_settings(settings)))
    }

    pub fn writer(&self, snapshot: &str) -> LanceChunkWriter {
        LanceChunkWriter::new(self.db.clone(), snapshot, self.embedder.clone())
    }

    /// The snapshot's table, `NotFound` when absent or emptied.
    async fn existing_table(&self, snapshot: &str) -> Result<Table> {
        validate_snapshot_name(snapshot)?;
        if !table_exists(&self.db, snapshot).await? {
            return Err(Error::NotFound(format!("snapshot '{snapshot}' has not been built")));
        }
        let table = self.db.open_table(snapshot).execute().await.map_err(anyhow::Error::from)?;
        if table.count_rows(None).await.map_err(anyhow::Error::from)? == 0 {
            return Err(Error::NotFound(format!("snapshot '{snapshot}' is empty")));
        }
        Ok(table)
    }
}

impl VectorStore for LanceStore {
    type Index = LanceDenseIndex;

    async fn write_snapshot(&self, snapshot: &str, chunks: &[Chunk]) -> Result<usize> {
        validate_snapshot_name(snapshot)?;
        Ok(self.writer(snapshot).rebuild(chunks).await?)
    }

    async fn open(&self, snapshot: &str) -> Result<LanceDenseIndex> {
        let table = self.existing_table(snapshot).await?;
        Ok(LanceDenseIndex { table, embedder: self.embedder.clone(), params: self.params })
    }

    async fn load_chunks(&self, snapshot: &str) -> Result<Vec<Chunk>> {
        let table = self.existing_table(snapshot).await?;
        let mut stream = table.query().execute().await.map_err(anyhow::Error::from)?;
        let mut chunks = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(anyhow::Error::from)? {
            chunks.extend(record_batch_to_rows(&batch)?.into_iter().map(|(c, _)| c));
        }
        chunks.sort_by(|a, b| {
            (&a.repository, &a.source_path, a.chunk_index).cmp(&(&b.repository, &b.source_path, b.chunk_index))
        });
        Ok(chunks)
    }

    async fn drop_snapshot(&self, snapshot: &str) -> Result<()> {
        validate_snapshot_name(snapshot)?;
        Ok(self.writer(snapshot).clear().await?)
    }
}

pub struct LanceDenseIndex {
    table: Table,
    embedder: Arc<dyn Embedder>,
    params: MmrParams,
}

impl LanceDenseIndex {
    async fn nearest(&self, query_vec: Vec<f32>, limit: usize) -> anyhow::Result<Vec<(Chunk, Vec<f32>)>> {
        let mut stream = self
            .table
            .vector_search(query_vec)?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await?;
        let mut rows = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            for (chunk, vector) in record_batch_to_rows(&batch)? {
                let vector = vector.ok_or_else(|| anyhow!("row {} has no vector", chunk.id()))?;
                rows.push((chunk, vector));
            }
        }
        Ok(rows)
    }
}

impl DenseIndex for LanceDenseIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(self.embedder.as_ref(), query)?;
        let fetch = self.params.fetch_k.max(k);
        let rows = self.nearest(query_vec.clone(), fetch).await?;
        let vectors: Vec<Vec<f32>> = rows.iter().map(|(_, v)| v.clone()).collect();
        let picks = mmr_select(&query_vec, &vectors, k, self.params.lambda);
        debug!(fetched = rows.len(), selected = picks.len(), "dense search");
        Ok(picks.into_iter().map(|i| rows[i].0.clone()).collect())
    }
}
