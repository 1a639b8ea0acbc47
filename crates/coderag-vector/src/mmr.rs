//! Maximal marginal relevance selection.
//!
//! Each step picks the candidate maximising
//! `lambda * sim(query, d) - (1 - lambda) * max(sim(d, s) for s in selected)`,
//! so later picks trade relevance for novelty against what is already chosen.
use coderag_core::config::RetrievalSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MmrParams {
    /// Nearest neighbours fetched before selection.
    pub fetch_k: usize,
    /// 1.0 keeps pure similarity order, 0.0 maximises diversity.
    pub lambda: f32,
}

impl Default for MmrParams {
    fn default() -> Self {
        Self { fetch_k: 20, lambda: 0.5 }
    }
}

impl MmrParams {
    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self { fetch_k: settings.mmr_fetch_k, lambda: settings.mmr_lambda }
    }
}

/// Cosine similarity; 0.0 when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Indices of up to `k` candidates in selection order. Ties go to the
/// earlier candidate, i.e. the nearer one when candidates come sorted by
/// distance.
pub fn mmr_select(query: &[f32], candidates: &[Vec<f32>], k: usize, lambda: f32) -> Vec<usize> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }
    let relevance: Vec<f32> = candidates.iter().map(|c| cosine_similarity(query, c)).collect();
    // Highest similarity to anything selected so far, per candidate.
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];
    let mut taken = vec![false; candidates.len()];
    let mut selected = Vec::with_capacity(k);

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for (i, rel) in relevance.iter().enumerate() {
            if taken[i] {
                continue;
            }
            let score = if selected.is_empty() { *rel } else { lambda * rel - (1.0 - lambda) * redundancy[i] };
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((i, score));
            }
        }
        let Some((pick, _)) = best else { break };
        taken[pick] = true;
        selected.push(pick);
        for (i, c) in candidates.iter().enumerate() {
            if !taken[i] {
                redundancy[i] = redundancy[i].max(cosine_similarity(c, &candidates[pick]));
            }
        }
    }
    selected
}
