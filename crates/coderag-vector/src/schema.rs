use arrow_schema::{Schema, Field, DataType};
use std::sync::Arc;

/// Row layout of a snapshot table: the chunk fields plus its embedding.
pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("source_path", DataType::Utf8, false),
		Field::new("repository", DataType::Utf8, true),
		Field::new("language", DataType::Utf8, false),
		Field::new("chunk_index", DataType::Int32, false),
		Field::new("total_chunks", DataType::Int32, false),
		Field::new("span_start", DataType::Int64, false),
		Field::new("span_end", DataType::Int64, false),
		Field::new("start_line", DataType::Int32, false),
		Field::new("end_line", DataType::Int32, false),
		Field::new("original_text", DataType::Utf8, false),
		Field::new("embedding_text", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
