//! Cross-encoder re-ranking with graceful degradation.
//!
//! The scorer for a model id is loaded at most once per [`ModelCache`]; the
//! first attempt decides for the cache's lifetime, so a model that failed to
//! load is not retried on every query. When no scorer is available, or
//! scoring fails, the fused order is kept and truncated to the top `N`.
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use coderag_core::config::RetrievalSettings;
use coderag_core::error::{Error, Result};
use coderag_core::traits::RelevanceScorer;
use coderag_core::types::RankedResult;
use coderag_embed::CrossEncoderModel;

pub type ModelLoader = Arc<dyn Fn(&str) -> anyhow::Result<Arc<dyn RelevanceScorer>> + Send + Sync>;

enum ModelSlot {
    Ready(Arc<dyn RelevanceScorer>),
    Unavailable(String),
}

static GLOBAL_CACHE: Lazy<Arc<ModelCache>> = Lazy::new(|| Arc::new(ModelCache::new()));

/// Memoized scorer handles keyed by model id.
#[derive(Default)]
pub struct ModelCache {
    slots: Mutex<HashMap<String, Arc<OnceCell<ModelSlot>>>>,
    load_attempts: AtomicUsize,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache shared by every [`Reranker::from_settings`].
    pub fn global() -> Arc<ModelCache> {
        GLOBAL_CACHE.clone()
    }

    /// The scorer for `model_id`, loading it on first use. Concurrent first
    /// callers block on a single load.
    pub fn get_or_load(&self, model_id: &str, loader: &ModelLoader) -> Result<Arc<dyn RelevanceScorer>> {
        let cell = self.slots.lock().entry(model_id.to_string()).or_default().clone();
        let slot = cell.get_or_init(|| {
            self.load_attempts.fetch_add(1, Ordering::SeqCst);
            match loader(model_id) {
                Ok(scorer) => {
                    info!(model = model_id, "re-ranker model ready");
                    ModelSlot::Ready(scorer)
                }
                Err(e) => {
                    warn!(model = model_id, error = %e, "re-ranker model unavailable");
                    ModelSlot::Unavailable(format!("{model_id}: {e:#}"))
                }
            }
        });
        match slot {
            ModelSlot::Ready(scorer) => Ok(scorer.clone()),
            ModelSlot::Unavailable(reason) => Err(Error::ModelUnavailable(reason.clone())),
        }
    }

    /// Number of loader invocations so far.
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    /// True once `model_id` loaded successfully; a memoized failure is not loaded.
    pub fn is_loaded(&self, model_id: &str) -> bool {
        self.slots.lock().get(model_id).is_some_and(|c| matches!(c.get(), Some(ModelSlot::Ready(_))))
    }

    /// Forgets every handle; the next use loads again.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

/// Loads cross-encoders from the model directories configured in `settings`.
pub fn cross_encoder_loader(settings: &RetrievalSettings) -> ModelLoader {
    let root = settings.model_root();
    Arc::new(move |model_id: &str| -> anyhow::Result<Arc<dyn RelevanceScorer>> {
        Ok(Arc::new(CrossEncoderModel::from_model_id(model_id, root.as_deref())?))
    })
}

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub results: Vec<RankedResult>,
    /// False when the fused order was kept because no scorer was usable.
    pub reranked: bool,
}

#[derive(Clone)]
pub struct Reranker {
    model_id: String,
    top_n: usize,
    cache: Arc<ModelCache>,
    loader: ModelLoader,
}

impl Reranker {
    pub fn new(model_id: impl Into<String>, top_n: usize, cache: Arc<ModelCache>, loader: ModelLoader) -> Self {
        Self { model_id: model_id.into(), top_n, cache, loader }
    }

    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self::new(
            settings.reranker_model.clone(),
            settings.rerank_top_n,
            ModelCache::global(),
            cross_encoder_loader(settings),
        )
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    fn degrade(&self, mut fused: Vec<RankedResult>) -> RerankOutcome {
        fused.truncate(self.top_n);
        RerankOutcome { results: fused, reranked: false }
    }

    /// Top `N` of `fused` by cross-encoder score over `original_text`, or
    /// `fused[..N]` unchanged when scoring is unavailable.
    pub fn rerank(&self, query: &str, fused: Vec<RankedResult>) -> RerankOutcome {
        if fused.is_empty() {
            return RerankOutcome { results: fused, reranked: false };
        }
        let scorer = match self.cache.get_or_load(&self.model_id, &self.loader) {
            Ok(scorer) => scorer,
            Err(e) => {
                warn!(error = %e, "re-ranking skipped");
                return self.degrade(fused);
            }
        };

        let texts: Vec<&str> = fused.iter().map(|r| r.chunk.original_text.as_str()).collect();
        let scores = match scorer.score(query, &texts) {
            Ok(scores) if scores.len() == fused.len() => scores,
            Ok(scores) => {
                warn!(expected = fused.len(), got = scores.len(), "re-ranker returned wrong number of scores");
                return self.degrade(fused);
            }
            Err(e) => {
                warn!(error = %e, "re-ranker scoring failed");
                return self.degrade(fused);
            }
        };

        let mut scored: Vec<(f32, RankedResult)> = scores
            .into_iter()
            .map(|s| if s.is_nan() { f32::NEG_INFINITY } else { s })
            .zip(fused)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(self.top_n);
        debug!(kept = scored.len(), "re-ranked");
        let results = scored
            .into_iter()
            .map(|(s, mut r)| {
                r.score = s;
                r
            })
            .collect();
        RerankOutcome { results, reranked: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coderag_core::types::{Chunk, Provenance};

    struct LengthScorer;

    impl RelevanceScorer for LengthScorer {
        fn model_id(&self) -> &str {
            "length"
        }
        fn score(&self, _query: &str, documents: &[&str]) -> anyhow::Result<Vec<f32>> {
            Ok(documents.iter().map(|d| d.len() as f32).collect())
        }
    }

    fn result(text: &str, fused: f32) -> RankedResult {
        let chunk = Chunk {
            source_path: format!("{text}.rs"),
            repository: None,
            language: "rust".into(),
            chunk_index: 0,
            total_chunks: 1,
            span: 0..text.len(),
            start_line: 1,
            end_line: 1,
            original_text: text.into(),
            embedding_text: text.into(),
        };
        RankedResult { chunk, score: fused, fused_score: fused, provenance: Provenance::default() }
    }

    fn loader_ok() -> ModelLoader {
        Arc::new(|_: &str| -> anyhow::Result<Arc<dyn RelevanceScorer>> { Ok(Arc::new(LengthScorer)) })
    }

    #[test]
    fn orders_by_scorer_and_keeps_fused_score() {
        let reranker = Reranker::new("length", 2, Arc::new(ModelCache::new()), loader_ok());
        let out = reranker.rerank("q", vec![result("a", 0.3), result("ccc", 0.2), result("bb", 0.1)]);
        assert!(out.reranked);
        let texts: Vec<&str> = out.results.iter().map(|r| r.chunk.original_text.as_str()).collect();
        assert_eq!(texts, vec!["ccc", "bb"]);
        assert_eq!(out.results[0].score, 3.0);
        assert_eq!(out.results[0].fused_score, 0.2);
    }

    #[test]
    fn failed_load_is_memoized() {
        let cache = ModelCache::new();
        let loader: ModelLoader =
            Arc::new(|id: &str| -> anyhow::Result<Arc<dyn RelevanceScorer>> { Err(anyhow::anyhow!("no weights for {id}")) });
        for _ in 0..3 {
            assert!(matches!(cache.get_or_load("m", &loader), Err(Error::ModelUnavailable(_))));
        }
        assert_eq!(cache.load_attempts(), 1);
        cache.clear();
        assert!(cache.get_or_load("m", &loader).is_err());
        assert_eq!(cache.load_attempts(), 2);
    }

    enum Faulty {
        Fails,
        ShortByOne,
        Constant,
    }

    impl RelevanceScorer for Faulty {
        fn model_id(&self) -> &str {
            "faulty"
        }
        fn score(&self, _query: &str, documents: &[&str]) -> anyhow::Result<Vec<f32>> {
            match self {
                Faulty::Fails => anyhow::bail!("inference failed"),
                Faulty::ShortByOne => Ok(vec![1.0; documents.len().saturating_sub(1)]),
                Faulty::Constant => Ok(vec![0.5; documents.len()]),
            }
        }
    }

    fn reranker_with(scorer: Faulty, top_n: usize) -> Reranker {
        let scorer: Arc<dyn RelevanceScorer> = Arc::new(scorer);
        let loader: ModelLoader = Arc::new(move |_: &str| -> anyhow::Result<Arc<dyn RelevanceScorer>> { Ok(scorer.clone()) });
        Reranker::new("faulty", top_n, Arc::new(ModelCache::new()), loader)
    }

    fn fused() -> Vec<RankedResult> {
        vec![result("alpha", 0.4), result("b", 0.3), result("cc", 0.2), result("dddd", 0.1)]
    }

    fn texts(results: &[RankedResult]) -> Vec<&str> {
        results.iter().map(|r| r.chunk.original_text.as_str()).collect()
    }

    #[test]
    fn scoring_error_keeps_fused_prefix() {
        let out = reranker_with(Faulty::Fails, 2).rerank("q", fused());
        assert!(!out.reranked);
        assert_eq!(texts(&out.results), vec!["alpha", "b"]);
        assert!(out.results.iter().all(|r| r.score == r.fused_score));
    }

    #[test]
    fn wrong_score_count_keeps_fused_prefix() {
        let reranker = reranker_with(Faulty::ShortByOne, 3);
        let out = reranker.rerank("q", fused());
        assert!(!out.reranked);
        assert_eq!(texts(&out.results), vec!["alpha", "b", "cc"]);
        assert!(reranker.cache.is_loaded("faulty"));
    }

    #[test]
    fn equal_scores_keep_fused_order() {
        let out = reranker_with(Faulty::Constant, 4).rerank("q", fused());
        assert!(out.reranked);
        assert_eq!(texts(&out.results), vec!["alpha", "b", "cc", "dddd"]);
        assert!(out.results.iter().all(|r| r.score == 0.5));
    }

    #[test]
    fn missing_model_is_never_marked_loaded() {
        let cache = ModelCache::new();
        let loader: ModelLoader =
            Arc::new(|_: &str| -> anyhow::Result<Arc<dyn RelevanceScorer>> { Err(anyhow::anyhow!("absent")) });
        assert!(!cache.is_loaded("m"));
        assert!(cache.get_or_load("m", &loader).is_err());
        assert!(!cache.is_loaded("m"));
    }
}
