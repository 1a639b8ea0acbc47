//! Builds snapshot tables: embeds chunk text in batches and writes rows.
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use arrow_array::{RecordBatch, RecordBatchIterator};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use coderag_core::traits::Embedder;
use coderag_core::types::Chunk;

use crate::table::{chunks_to_record_batch, document_predicate, ensure_table, table_exists};

const ALL_ROWS: &str = "id IS NOT NULL";

pub struct LanceChunkWriter {
	db: Connection,
	table_name: String,
	embedder: Arc<dyn Embedder>,
	batch_size: usize,
}

impl LanceChunkWriter {
	pub fn new(db: Connection, table_name: &str, embedder: Arc<dyn Embedder>) -> Self {
		Self { db, table_name: table_name.to_string(), embedder, batch_size: 64 }
	}

	#[must_use]
	pub fn with_batch_size(mut self, batch_size: usize) -> Self {
		self.batch_size = batch_size.max(1);
		self
	}

	fn dim(&self) -> Result<i32> {
		Ok(i32::try_from(self.embedder.dim())?)
	}

	/// Embeds every chunk before touching the table, so an embedding failure
	/// leaves the table as it was.
	fn embed_all(&self, chunks: &[Chunk], dim: i32) -> Result<Vec<RecordBatch>> {
		let pb = ProgressBar::new(chunks.len() as u64);
		pb.set_style(
			ProgressStyle::default_bar()
				.template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
				.unwrap_or_else(|_| ProgressStyle::default_bar())
				.progress_chars("#>-"),
		);
		let mut batches = Vec::with_capacity(chunks.len().div_ceil(self.batch_size));
		for batch in chunks.chunks(self.batch_size) {
			let texts: Vec<String> = batch.iter().map(|c| c.embedding_text.clone()).collect();
			let vectors = match self.embedder.embed_batch(&texts) {
				Ok(v) => v,
				Err(e) => {
					pb.abandon();
					return Err(e);
				}
			};
			batches.push(chunks_to_record_batch(batch, &vectors, dim)?);
			pb.inc(batch.len() as u64);
		}
		pb.finish_and_clear();
		Ok(batches)
	}

	/// Deletes rows matching `predicates`, then appends `batches` as one commit.
	async fn commit(&self, predicates: &[String], batches: Vec<RecordBatch>, dim: i32) -> Result<usize> {
		ensure_table(&self.db, &self.table_name, dim).await?;
		let table = self.db.open_table(&self.table_name).execute().await?;
		for predicate in predicates {
			table.delete(predicate).await?;
			debug!(table = %self.table_name, predicate = %predicate, "deleted rows");
		}
		let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
		if let Some(first) = batches.first() {
			let schema = first.schema();
			let reader = Box::new(RecordBatchIterator::new(batches.into_iter().map(Ok), schema));
			table.add(reader).execute().await?;
		}
		info!(table = %self.table_name, rows, "wrote chunks");
		Ok(rows)
	}

	/// Appends `chunks`, creating the table on first write. Returns rows written.
	pub async fn write(&self, chunks: &[Chunk]) -> Result<usize> {
		let dim = self.dim()?;
		let batches = self.embed_all(chunks, dim)?;
		self.commit(&[], batches, dim).await
	}

	/// Replaces the whole table with `chunks`. Nothing is deleted until every
	/// chunk is embedded, and the new rows land in a single append, so readers
	/// never see part of the new set.
	pub async fn rebuild(&self, chunks: &[Chunk]) -> Result<usize> {
		let dim = self.dim()?;
		let batches = self.embed_all(chunks, dim)?;
		self.commit(&[ALL_ROWS.to_string()], batches, dim).await
	}

	/// Re-ingestion: swaps the rows of the documents present in `chunks` for
	/// their new chunk sets.
	pub async fn replace_documents(&self, chunks: &[Chunk]) -> Result<usize> {
		let dim = self.dim()?;
		let batches = self.embed_all(chunks, dim)?;
		let documents: BTreeSet<(Option<&str>, &str)> =
			chunks.iter().map(|c| (c.repository.as_deref(), c.source_path.as_str())).collect();
		let predicates: Vec<String> = documents.into_iter().map(|(repo, path)| document_predicate(path, repo)).collect();
		self.commit(&predicates, batches, dim).await
	}

	/// Deletes every row; the table itself stays.
	pub async fn clear(&self) -> Result<()> {
		if table_exists(&self.db, &self.table_name).await? {
			let table = self.db.open_table(&self.table_name).execute().await?;
			table.delete(ALL_ROWS).await?;
		}
		Ok(())
	}
}
