use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device};
use candle_transformers::models::xlm_roberta::XLMRobertaModel;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use coderag_core::traits::Embedder;

use crate::device::select_device;
use crate::model::{load_model_files, resolve_model_dir};
use crate::pool::masked_mean_l2;
use crate::tokenize::pad_batch;

pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-m3";
const MAX_LEN: usize = 512;
const BATCH: usize = 16;

/// Mean-pooled, L2-normalized sentence embeddings from an XLM-RoBERTa encoder.
pub struct XlmRobertaEmbedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
}

impl XlmRobertaEmbedder {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        let files = load_model_files(model_dir, &device)?;
        let dim = files.config.hidden_size;
        let model = XLMRobertaModel::new(&files.config, files.vb)?;
        info!(dir = %model_dir.display(), dim, "embedding model loaded");
        Ok(Self { model, tokenizer: files.tokenizer, device, dim })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = texts
            .iter()
            .map(|t| self.tokenizer.encode(t.as_str(), true).map_err(|e| anyhow!("Tokenization failed: {}", e)))
            .collect::<Result<Vec<_>>>()?;
        let (input_ids, attention_mask) = pad_batch(&encodings, MAX_LEN, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?.to_dtype(DType::I64)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        Ok(pooled.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec2()?)
    }
}

impl Embedder for XlmRobertaEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { MAX_LEN }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH) {
            out.extend(self.embed_chunk(chunk)?);
        }
        debug!(texts = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(out)
    }
}

/// Deterministic bag-of-tokens hashing embedder; no model files needed.
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { MAX_LEN }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// The fake embedder when `APP_USE_FAKE_EMBEDDINGS` is set, otherwise the
/// XLM-RoBERTa model found for [`DEFAULT_EMBEDDING_MODEL`].
pub fn get_default_embedder(model_root: Option<&Path>) -> Result<Arc<dyn Embedder>> {
    if use_fake_embeddings() {
        info!("using fake embedder");
        return Ok(Arc::new(FakeEmbedder::new(1024)));
    }
    let dir = resolve_model_dir(DEFAULT_EMBEDDING_MODEL, model_root)?;
    Ok(Arc::new(XlmRobertaEmbedder::load(&dir)?))
}
