use anyhow::{anyhow, Result};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Value};
use tantivy::{doc, Index, IndexWriter, Searcher, TantivyDocument};
use tracing::{debug, info};

use coderag_core::types::Chunk;

use crate::tantivy_utils::{build_schema, register_tokenizer};

/// In-memory BM25 index over the `embedding_text` of one snapshot's chunks.
///
/// Built once per snapshot and shared read-only by every query of the
/// session; a rebuild produces a new value.
pub struct SparseIndex {
	index: Index,
	searcher: Searcher,
	ord_field: Field,
	text_field: Field,
	chunks: Vec<Chunk>,
}

impl SparseIndex {
	pub fn build(chunks: Vec<Chunk>) -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let ord_field = schema.get_field("ord")?;
		let id_field = schema.get_field("id")?;
		let text_field = schema.get_field("text")?;

		let mut index_writer: IndexWriter = index.writer_with_num_threads(1, 50_000_000)?;
		for (ord, c) in chunks.iter().enumerate() {
			index_writer.add_document(doc!(
				ord_field => ord as u64,
				id_field => c.id(),
				text_field => c.embedding_text.clone(),
			))?;
		}
		index_writer.commit()?;

		let searcher = index.reader()?.searcher();
		info!(chunks = chunks.len(), "built sparse index");
		Ok(Self { index, searcher, ord_field, text_field, chunks })
	}

	pub fn len(&self) -> usize { self.chunks.len() }

	pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

	/// Every chunk in the index, in build order.
	pub fn chunks(&self) -> &[Chunk] { &self.chunks }

	/// Up to `k` chunks by descending BM25 score. Query syntax errors are
	/// tolerated: whatever parses is searched.
	pub fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
		Ok(self.search_scored(query, k)?.into_iter().map(|(_, c)| c.clone()).collect())
	}

	pub fn search_scored(&self, query: &str, k: usize) -> Result<Vec<(f32, &Chunk)>> {
		if k == 0 || self.chunks.is_empty() { return Ok(Vec::new()); }
		let qp = QueryParser::for_index(&self.index, vec![self.text_field]);
		let (q, errors) = qp.parse_query_lenient(query);
		if !errors.is_empty() { debug!(query, errors = errors.len(), "lenient query parse"); }

		let top_docs = self.searcher.search(&q, &TopDocs::with_limit(k))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = self.searcher.doc(addr)?;
			let ord = doc.get_first(self.ord_field).and_then(|v| v.as_u64()).ok_or_else(|| anyhow!("indexed chunk without ordinal"))?;
			let chunk = usize::try_from(ord).ok().and_then(|i| self.chunks.get(i)).ok_or_else(|| anyhow!("ordinal {ord} out of range"))?;
			hits.push((score, chunk));
		}
		debug!(query, hits = hits.len(), "sparse search");
		Ok(hits)
	}
}
