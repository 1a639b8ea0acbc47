//! Layered configuration and path helpers.
//!
//! Figment merges `config.toml`, then `config.<env>.toml` (env from
//! `RUST_ENV`), then `APP_*` environment variables with `__` as the nesting
//! separator, e.g. `APP_RETRIEVAL__CHUNK_SIZE=800`. Retrieval settings live
//! under the `retrieval` key and fall back to [`RetrievalSettings::default`]
//! field by field.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const SETTINGS_KEY: &str = "retrieval";

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    /// Retrieval settings with defaults filled in, validated.
    pub fn settings(&self) -> Result<RetrievalSettings> {
        let settings: RetrievalSettings =
            Figment::from(Serialized::default(SETTINGS_KEY, RetrievalSettings::default()))
                .merge(self.figment.clone())
                .extract_inner(SETTINGS_KEY)
                .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Tunables of the retrieval pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Results kept from the dense (MMR) lookup.
    pub dense_k: usize,
    pub sparse_k: usize,
    /// Length of the fused list handed to the re-ranker.
    pub fusion_k: usize,
    /// Nearest neighbours fetched before MMR selection.
    pub mmr_fetch_k: usize,
    /// 1.0 is pure relevance, 0.0 pure diversity.
    pub mmr_lambda: f32,
    pub rrf_k: f64,
    pub reranker_model: String,
    pub rerank_top_n: usize,
    pub header_preview_chars: usize,
    pub header_match_chars: usize,
    pub identity_prefix_chars: usize,
    /// Root holding local model directories; `~` and `${VAR}` are expanded.
    pub model_dir: Option<String>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            chunk_overlap: 200,
            dense_k: 6,
            sparse_k: 6,
            fusion_k: 6,
            mmr_fetch_k: 20,
            mmr_lambda: 0.5,
            rrf_k: 60.0,
            reranker_model: "BAAI/bge-reranker-base".to_string(),
            rerank_top_n: 4,
            header_preview_chars: 400,
            header_match_chars: 100,
            identity_prefix_chars: 50,
            model_dir: None,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));
        if self.chunk_size == 0 {
            return invalid("chunk_size must be positive".into());
        }
        if self.chunk_overlap >= self.chunk_size {
            return invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            ));
        }
        for (name, value) in [
            ("dense_k", self.dense_k),
            ("sparse_k", self.sparse_k),
            ("fusion_k", self.fusion_k),
            ("mmr_fetch_k", self.mmr_fetch_k),
            ("rerank_top_n", self.rerank_top_n),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be positive"));
            }
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return invalid(format!("mmr_lambda must be within [0, 1], got {}", self.mmr_lambda));
        }
        if !self.rrf_k.is_finite() || self.rrf_k < 0.0 {
            return invalid(format!("rrf_k must be a non-negative number, got {}", self.rrf_k));
        }
        if self.reranker_model.trim().is_empty() {
            return invalid("reranker_model must not be empty".into());
        }
        Ok(())
    }

    pub fn model_root(&self) -> Option<PathBuf> {
        self.model_dir.as_deref().map(expand_path)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve `p` against `base` after expansion; absolute paths are returned as-is.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let s = RetrievalSettings::default();
        assert!(s.validate().is_ok());
        assert_eq!((s.chunk_size, s.chunk_overlap, s.rerank_top_n), (1500, 200, 4));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let s = RetrievalSettings { chunk_size: 100, chunk_overlap: 100, ..Default::default() };
        assert!(matches!(s.validate(), Err(Error::InvalidConfig(_))));
        let s = RetrievalSettings { mmr_lambda: 1.5, ..Default::default() };
        assert!(s.validate().is_err());
        let s = RetrievalSettings { fusion_k: 0, ..Default::default() };
        assert!(s.validate().is_err());
    }

    #[test]
    fn layers_file_and_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [retrieval]
                chunk_size = 800
                rerank_top_n = 3
                "#,
            )?;
            jail.set_env("RUST_ENV", "test");
            jail.set_env("APP_RETRIEVAL__RERANK_TOP_N", "2");

            let settings = Config::load().expect("load").settings().expect("settings");
            assert_eq!(settings.chunk_size, 800);
            assert_eq!(settings.rerank_top_n, 2);
            assert_eq!(settings.chunk_overlap, 200);
            assert_eq!(settings.reranker_model, "BAAI/bge-reranker-base");
            Ok(())
        });
    }

    #[test]
    fn missing_section_uses_defaults() {
        let config = Config::from_figment(Figment::new());
        assert_eq!(config.settings().expect("settings"), RetrievalSettings::default());
    }

    #[test]
    fn invalid_file_values_surface_as_invalid_config() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[retrieval]\nchunk_overlap = 5000\n")?;
            let err = Config::load().expect("load").settings().unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)));
            Ok(())
        });
    }

    #[test]
    fn resolves_relative_paths_against_base() {
        let base = Path::new("/srv/models");
        assert_eq!(resolve_with_base(base, "bge"), PathBuf::from("/srv/models/bge"));
        assert_eq!(resolve_with_base(base, "/abs/bge"), PathBuf::from("/abs/bge"));
    }
}
