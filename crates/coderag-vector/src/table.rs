//! LanceDB connection helpers and Arrow conversions for chunk rows.
use anyhow::{anyhow, Context, Result};
use lancedb::{connect, Connection};
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, ArrayRef, FixedSizeListArray, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use std::sync::Arc;

use coderag_core::types::Chunk;

use crate::schema::build_chunk_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.table_names().execute().await?.iter().any(|n| n == name))
}

/// Creates an empty table with the chunk schema when it does not exist yet.
pub async fn ensure_table(conn: &Connection, name: &str, dim: i32) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    let schema = build_chunk_schema(dim);
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

/// SQL string literal with single quotes escaped.
pub fn sql_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Predicate selecting every row of one document.
pub fn document_predicate(source_path: &str, repository: Option<&str>) -> String {
    match repository {
        Some(repo) => format!("source_path = {} AND repository = {}", sql_quote(source_path), sql_quote(repo)),
        None => format!("source_path = {} AND repository IS NULL", sql_quote(source_path)),
    }
}

fn to_i32(v: usize, what: &str) -> Result<i32> {
    i32::try_from(v).with_context(|| format!("{what} {v} does not fit the table schema"))
}

fn to_i64(v: usize, what: &str) -> Result<i64> {
    i64::try_from(v).with_context(|| format!("{what} {v} does not fit the table schema"))
}

pub fn chunks_to_record_batch(chunks: &[Chunk], vectors: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
    if chunks.len() != vectors.len() {
        return Err(anyhow!("{} chunks but {} vectors", chunks.len(), vectors.len()));
    }
    if let Some(v) = vectors.iter().find(|v| v.len() as i64 != i64::from(dim)) {
        return Err(anyhow!("vector of length {} in a table of dimension {}", v.len(), dim));
    }
    let schema = build_chunk_schema(dim);

    let mut chunk_indices = Vec::with_capacity(chunks.len());
    let mut totals = Vec::with_capacity(chunks.len());
    let mut span_starts = Vec::with_capacity(chunks.len());
    let mut span_ends = Vec::with_capacity(chunks.len());
    let mut start_lines = Vec::with_capacity(chunks.len());
    let mut end_lines = Vec::with_capacity(chunks.len());
    for c in chunks {
        chunk_indices.push(to_i32(c.chunk_index, "chunk_index")?);
        totals.push(to_i32(c.total_chunks, "total_chunks")?);
        span_starts.push(to_i64(c.span.start, "span start")?);
        span_ends.push(to_i64(c.span.end, "span end")?);
        start_lines.push(to_i32(c.start_line, "start_line")?);
        end_lines.push(to_i32(c.end_line, "end_line")?);
    }
    let vectors = vectors.iter().map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>()));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(chunks.iter().map(Chunk::id))),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.source_path.as_str()))),
        Arc::new(chunks.iter().map(|c| c.repository.as_deref()).collect::<StringArray>()),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.language.as_str()))),
        Arc::new(Int32Array::from(chunk_indices)),
        Arc::new(Int32Array::from(totals)),
        Arc::new(Int64Array::from(span_starts)),
        Arc::new(Int64Array::from(span_ends)),
        Arc::new(Int32Array::from(start_lines)),
        Arc::new(Int32Array::from(end_lines)),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.original_text.as_str()))),
        Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.embedding_text.as_str()))),
        Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim)),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow!("column '{}' missing or mistyped", name))
}

fn to_usize<T: TryInto<usize> + Copy + std::fmt::Display>(v: T, what: &str) -> Result<usize> {
    v.try_into().map_err(|_| anyhow!("negative {what}: {v}"))
}

/// Decodes rows back into chunks, with their vectors when the batch has them.
pub fn record_batch_to_rows(batch: &RecordBatch) -> Result<Vec<(Chunk, Option<Vec<f32>>)>> {
    let source_path = column::<StringArray>(batch, "source_path")?;
    let repository = column::<StringArray>(batch, "repository")?;
    let language = column::<StringArray>(batch, "language")?;
    let chunk_index = column::<Int32Array>(batch, "chunk_index")?;
    let total_chunks = column::<Int32Array>(batch, "total_chunks")?;
    let span_start = column::<Int64Array>(batch, "span_start")?;
    let span_end = column::<Int64Array>(batch, "span_end")?;
    let start_line = column::<Int32Array>(batch, "start_line")?;
    let end_line = column::<Int32Array>(batch, "end_line")?;
    let original_text = column::<StringArray>(batch, "original_text")?;
    let embedding_text = column::<StringArray>(batch, "embedding_text")?;
    let vectors = batch.column_by_name("vector").and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let chunk = Chunk {
            source_path: source_path.value(i).to_string(),
            repository: repository.is_valid(i).then(|| repository.value(i).to_string()),
            language: language.value(i).to_string(),
            chunk_index: to_usize(chunk_index.value(i), "chunk_index")?,
            total_chunks: to_usize(total_chunks.value(i), "total_chunks")?,
            span: to_usize(span_start.value(i), "span start")?..to_usize(span_end.value(i), "span end")?,
            start_line: to_usize(start_line.value(i), "start_line")?,
            end_line: to_usize(end_line.value(i), "end_line")?,
            original_text: original_text.value(i).to_string(),
            embedding_text: embedding_text.value(i).to_string(),
        };
        let vector = vectors.filter(|v| v.is_valid(i)).map(|v| {
            v.value(i).as_primitive::<Float32Type>().values().iter().copied().collect::<Vec<f32>>()
        });
        rows.push((chunk, vector));
    }
    Ok(rows)
}
