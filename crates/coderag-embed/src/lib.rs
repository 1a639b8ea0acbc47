//! coderag-embed
//!
//! Local candle models: the XLM-RoBERTa sentence embedder behind the dense
//! index, a deterministic fake embedder for tests, and the cross-encoder used
//! to re-rank fused candidates.
pub mod cross_encoder;
pub mod device;
pub mod embedder;
pub mod model;
pub mod pool;
pub mod tokenize;

pub use cross_encoder::CrossEncoderModel;
pub use device::select_device;
pub use embedder::{get_default_embedder, use_fake_embeddings, FakeEmbedder, XlmRobertaEmbedder, DEFAULT_EMBEDDING_MODEL};
pub use model::resolve_model_dir;
pub use pool::masked_mean_l2;
