//! Cross-encoder relevance scoring (`BAAI/bge-reranker-base` and other
//! XLM-RoBERTa sequence classifiers with a single logit).
use anyhow::{anyhow, Result};
use std::path::Path;

use candle_core::{DType, Device};
use candle_transformers::models::xlm_roberta::XLMRobertaForSequenceClassification;
use tokenizers::{Tokenizer, TruncationParams, TruncationStrategy};
use tracing::{debug, info};

use coderag_core::traits::RelevanceScorer;

use crate::device::select_device;
use crate::model::{load_model_files, resolve_model_dir};
use crate::tokenize::pad_batch;

const MAX_LEN: usize = 512;
const BATCH: usize = 8;

pub struct CrossEncoderModel {
    model_id: String,
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
}

impl CrossEncoderModel {
    pub fn load(model_id: &str, model_dir: &Path) -> Result<Self> {
        let device = select_device();
        let mut files = load_model_files(model_dir, &device)?;
        files
            .tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_LEN,
                strategy: TruncationStrategy::OnlySecond,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;
        let model = XLMRobertaForSequenceClassification::new(1, &files.config, files.vb)?;
        info!(model = model_id, dir = %model_dir.display(), "cross-encoder loaded");
        Ok(Self { model_id: model_id.to_string(), model, tokenizer: files.tokenizer, device })
    }

    /// Resolves the model directory from `model_id` and `root`, then loads it.
    pub fn from_model_id(model_id: &str, root: Option<&Path>) -> Result<Self> {
        let dir = resolve_model_dir(model_id, root)?;
        Self::load(model_id, &dir)
    }

    fn score_chunk(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        let encodings = documents
            .iter()
            .map(|d| self.tokenizer.encode((query, *d), true).map_err(|e| anyhow!("Tokenization failed: {}", e)))
            .collect::<Result<Vec<_>>>()?;
        let (input_ids, attention_mask) = pad_batch(&encodings, MAX_LEN, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?.to_dtype(DType::I64)?;
        let logits = self.model.forward(&input_ids, &attention_mask, &token_type_ids)?;
        let probs = candle_nn::ops::sigmoid(&logits)?;
        Ok(probs.squeeze(1)?.to_device(&Device::Cpu)?.to_dtype(DType::F32)?.to_vec1()?)
    }
}

impl RelevanceScorer for CrossEncoderModel {
    fn model_id(&self) -> &str { &self.model_id }

    fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(documents.len());
        for chunk in documents.chunks(BATCH) {
            scores.extend(self.score_chunk(query, chunk)?);
        }
        debug!(pairs = documents.len(), "scored pairs");
        Ok(scores)
    }
}
