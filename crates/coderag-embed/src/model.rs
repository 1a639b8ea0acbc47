//! Locating and loading local XLM-RoBERTa style model directories.
//!
//! A model directory holds `tokenizer.json`, `config.json` and weights as
//! either `model.safetensors` or `pytorch_model.bin`.
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::Config as XLMRobertaConfig;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Last segment of a hub-style id: `BAAI/bge-reranker-base` -> `bge-reranker-base`.
pub fn model_dir_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}

/// Candidate directories for `model_id`, most specific first: under `root`
/// when given, under `APP_MODEL_DIR` / `MODEL_DIR`, then `../models` and
/// `models` relative to the working directory.
pub fn candidate_dirs(model_id: &str, root: Option<&Path>) -> Vec<PathBuf> {
    let name = model_dir_name(model_id);
    let mut roots: Vec<PathBuf> = Vec::new();
    roots.extend(root.map(Path::to_path_buf));
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            roots.push(PathBuf::from(dir));
        }
    }
    roots.push(PathBuf::from("../models"));
    roots.push(PathBuf::from("models"));

    let mut out = Vec::new();
    for r in roots {
        out.push(r.join(name));
        if name != model_id {
            out.push(r.join(model_id));
        }
    }
    out
}

pub fn resolve_model_dir(model_id: &str, root: Option<&Path>) -> Result<PathBuf> {
    for dir in candidate_dirs(model_id, root) {
        if dir.join("config.json").exists() {
            info!(model = model_id, dir = %dir.display(), "using model dir");
            return Ok(dir);
        }
        debug!(dir = %dir.display(), "model dir candidate missing");
    }
    Err(anyhow!("Could not locate model directory for '{}'", model_id))
}

pub struct LoadedModel<'a> {
    pub tokenizer: Tokenizer,
    pub config: XLMRobertaConfig,
    pub vb: VarBuilder<'a>,
}

pub fn load_model_files<'a>(model_dir: &Path, device: &Device) -> Result<LoadedModel<'a>> {
    let tokenizer_path = model_dir.join("tokenizer.json");
    let tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
    let config_path = model_dir.join("config.json");
    let config: XLMRobertaConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;

    let safetensors = model_dir.join("model.safetensors");
    let weights: HashMap<String, Tensor> = if safetensors.exists() {
        candle_core::safetensors::load(&safetensors, device)?
    } else {
        let weights_path = model_dir.join("pytorch_model.bin");
        candle_core::pickle::read_all(&weights_path)?.into_iter().collect()
    };
    debug!(tensors = weights.len(), dir = %model_dir.display(), "loaded weights");
    let vb = VarBuilder::from_tensors(weights, DType::F32, device);
    Ok(LoadedModel { tokenizer, config, vb })
}
