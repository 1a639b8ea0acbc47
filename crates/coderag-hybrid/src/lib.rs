//! coderag-hybrid
//!
//! Query-time half of the pipeline: dense and sparse lookups run
//! concurrently, their lists are fused with Reciprocal Rank Fusion and the
//! fused candidates are re-ranked by a cross-encoder when one is available.
//!
//! ```no_run
//! # async fn demo() -> coderag_core::Result<()> {
//! use coderag_core::{Document, RetrievalSettings};
//! use coderag_hybrid::Retriever;
//! use coderag_vector::LanceStore;
//!
//! let settings = RetrievalSettings::default();
//! let store = LanceStore::connect("data/lancedb", &settings).await?;
//! let retriever = Retriever::new(store, settings)?;
//! retriever.ingest("backend", &[Document::new("src/auth.py", "def login(): ...")]).await?;
//! let outcome = retriever.retrieve("where is login handled?", "backend").await?;
//! for r in &outcome.results {
//!     println!("{} {:.3}", r.chunk.display_label(), r.score);
//! }
//! # Ok(())
//! # }
//! ```
pub mod events;
pub mod fusion;
pub mod pipeline;
pub mod registry;
pub mod rerank;

pub use events::{answer_events, AnswerEvent};
pub use fusion::{FusionEngine, RankedList};
pub use pipeline::{IngestReport, QueryStage, RetrievalOutcome, Retriever};
pub use registry::{Snapshot, SnapshotRegistry};
pub use rerank::{cross_encoder_loader, ModelCache, ModelLoader, RerankOutcome, Reranker};
