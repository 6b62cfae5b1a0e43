//! Configuration for the correction engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CorrectorError, Result};

/// Configuration for the correction engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectorConfig {
    /// N-gram fuzzy matching.
    pub fuzzy: FuzzyConfig,

    /// Embedding-based retrieval.
    pub vector: VectorConfig,

    /// Embedding provider selection.
    pub embedding: EmbeddingConfig,

    /// Seed file loaded when the corrector is built.
    pub knowledge_base: Option<PathBuf>,
}

impl CorrectorConfig {
    /// Parse a TOML document. Missing sections fall back to defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| CorrectorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CorrectorError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Set the fuzzy configuration.
    pub fn with_fuzzy(mut self, config: FuzzyConfig) -> Self {
        self.fuzzy = config;
        self
    }

    /// Set the vector configuration.
    pub fn with_vector(mut self, config: VectorConfig) -> Self {
        self.vector = config;
        self
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Set the seed file.
    pub fn with_knowledge_base(mut self, path: impl Into<PathBuf>) -> Self {
        self.knowledge_base = Some(path.into());
        self
    }

    /// Check thresholds and sizes.
    pub fn validate(&self) -> Result<()> {
        check_unit("fuzzy.min_similarity", self.fuzzy.min_similarity)?;
        check_unit("vector.min_similarity", self.vector.min_similarity)?;
        check_unit("vector.apply_threshold", self.vector.apply_threshold)?;

        if self.fuzzy.max_window == 0 {
            return Err(CorrectorError::Config(
                "fuzzy.max_window must be at least 1".to_string(),
            ));
        }
        if self.vector.top_k == 0 {
            return Err(CorrectorError::Config(
                "vector.top_k must be at least 1".to_string(),
            ));
        }
        if self.vector.apply_threshold < self.vector.min_similarity {
            return Err(CorrectorError::Config(format!(
                "vector.apply_threshold ({}) is below vector.min_similarity ({})",
                self.vector.apply_threshold, self.vector.min_similarity
            )));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CorrectorError::Config(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

/// Configuration for the fuzzy n-gram stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Whether the stage runs at all.
    pub enabled: bool,

    /// Longest token window compared against mistake strings.
    pub max_window: usize,

    /// Minimum normalized Levenshtein similarity (0.0 to 1.0).
    pub min_similarity: f32,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_window: 5,
            min_similarity: 0.75,
        }
    }
}

/// Configuration for the embedding similarity stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Whether the stage runs and entries are vector-indexed.
    pub enabled: bool,

    /// Nearest neighbours requested from the index.
    pub top_k: usize,

    /// Hits below this similarity are dropped.
    pub min_similarity: f32,

    /// Hits at or above this similarity are applied; weaker hits are only
    /// reported.
    pub apply_threshold: f32,

    /// Deadline for one embedding call.
    pub embed_timeout_ms: u64,

    /// Deadline for one vector-index call.
    pub index_timeout_ms: u64,
}

impl VectorConfig {
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index_timeout_ms)
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 5,
            min_similarity: 0.3,
            apply_threshold: 0.7,
            embed_timeout_ms: 2_000,
            index_timeout_ms: 2_000,
        }
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model name passed to the provider.
    pub model: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: Option<String>,

    /// Bucket count of the hashing provider.
    pub dimension: usize,

    /// LRU size of the embedding cache; 0 disables caching.
    pub cache_max_entries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Hashing,
            model: None,
            base_url: None,
            dimension: stt_embeddings::DEFAULT_HASHING_DIMENSION,
            cache_max_entries: 1024,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAI,
    /// Offline character-trigram hashing.
    Hashing,
    /// No embeddings; the vector stage is skipped.
    None,
}
