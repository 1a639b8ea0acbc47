//! coderag-vector
//!
//! Dense retrieval signal. Snapshots are LanceDB tables of enriched chunks and
//! their embeddings; a search fetches the nearest rows by cosine distance and
//! selects a diverse top-k with maximal marginal relevance.
//!
//! - `schema`/`table`: Arrow layout and conversions
//! - `writer`: batch embedding and row writes
//! - `lance`: the LanceDB-backed [`coderag_core::VectorStore`]
//! - `memory`: an in-process store with identical semantics
pub mod lance;
pub mod memory;
pub mod mmr;
pub mod schema;
pub mod table;
pub mod writer;

pub use lance::{LanceDenseIndex, LanceStore};
pub use memory::{MemoryDenseIndex, MemoryVectorStore};
pub use mmr::{mmr_select, MmrParams};
pub use writer::LanceChunkWriter;
