//! The corrector facade wiring knowledge base, engine and vector collaborators.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use stt_embeddings::{
    CachedProvider, EmbeddingCache, EmbeddingProvider, HashingProvider, InMemoryVectorIndex,
    OpenAIProvider, VectorIndex,
};

use crate::config::{CorrectorConfig, EmbeddingConfig, EmbeddingProviderType};
use crate::engine::CorrectionEngine;
use crate::error::{CorrectorError, Result};
use crate::ingest::{AddOutcome, KnowledgeIngestor, ReindexReport};
use crate::knowledge::{EntryId, KnowledgeBase, KnowledgeEntry, KnowledgeSnapshot, NewCorrection};
use crate::seed::SeedReport;
use crate::types::{CorrectionResult, StatsResponse};
use crate::vector::VectorRetriever;

/// Speech-to-text corrector.
///
/// Reads never block on writes: every correction works on the snapshot that
/// was current when it started.
#[derive(Debug)]
pub struct SttCorrector {
    config: CorrectorConfig,
    knowledge: Arc<KnowledgeBase>,
    engine: CorrectionEngine,
    ingestor: KnowledgeIngestor,
    vectors: Option<Arc<VectorRetriever>>,
}

impl SttCorrector {
    /// Create a new corrector builder.
    pub fn builder() -> SttCorrectorBuilder {
        SttCorrectorBuilder::new()
    }

    /// Build a corrector from `config`, loading its seed file if set.
    pub async fn new(config: CorrectorConfig) -> Result<Self> {
        Self::builder().with_config(config).build().await
    }

    pub fn config(&self) -> &CorrectorConfig {
        &self.config
    }

    pub fn engine(&self) -> &CorrectionEngine {
        &self.engine
    }

    pub fn ingestor(&self) -> &KnowledgeIngestor {
        &self.ingestor
    }

    /// Correct one phrase.
    pub async fn correct(&self, text: &str) -> CorrectionResult {
        self.engine.correct(text).await
    }

    /// Correct several phrases concurrently, in order.
    pub async fn correct_batch<S>(&self, texts: &[S]) -> Vec<CorrectionResult>
    where
        S: AsRef<str> + Sync,
    {
        self.engine.correct_batch(texts).await
    }

    /// Correct every matching span of a longer text.
    pub async fn correct_plain(&self, text: &str) -> CorrectionResult {
        self.engine.correct_plain(text).await
    }

    pub async fn add_correction(&self, correction: NewCorrection) -> Result<AddOutcome> {
        self.ingestor.add(correction).await
    }

    pub async fn replace_correction(
        &self,
        id: EntryId,
        correction: NewCorrection,
    ) -> Result<AddOutcome> {
        self.ingestor.replace(id, correction).await
    }

    pub async fn remove_correction(&self, id: EntryId) -> Result<KnowledgeEntry> {
        self.ingestor.remove(id).await
    }

    /// Retry vector indexing of entries added while the index was failing,
    /// and deletion of vectors a failing index kept.
    pub async fn reindex_pending(&self) -> ReindexReport {
        self.ingestor.reindex_pending().await
    }

    pub async fn load_seed_file(&self, path: &Path) -> Result<SeedReport> {
        self.ingestor.load_seed_file(path).await
    }

    /// The current knowledge snapshot.
    pub async fn snapshot(&self) -> Arc<KnowledgeSnapshot> {
        self.knowledge.snapshot().await
    }

    pub async fn entry(&self, id: EntryId) -> Option<Arc<KnowledgeEntry>> {
        self.knowledge.snapshot().await.get(id).cloned()
    }

    /// Entry counts and vector index health.
    pub async fn stats(&self) -> StatsResponse {
        let snapshot = self.knowledge.snapshot().await;
        let indexed = snapshot.entries().filter(|e| e.vector_indexed).count();
        let vectors_stored = match &self.vectors {
            Some(vectors) => vectors.stored_vectors().await,
            None => 0,
        };
        let vector_enabled = self.vectors.is_some();

        StatsResponse {
            entries: snapshot.len(),
            mistakes: snapshot.mistake_count(),
            vector_indexed_entries: indexed,
            vector_pending_entries: if vector_enabled {
                snapshot.len() - indexed
            } else {
                0
            },
            vectors_stored,
            vectors_stale: self.ingestor.stale_vectors().await,
            embedding_provider: self.vectors.as_ref().map(|v| v.provider_name().to_string()),
            vector_enabled,
        }
    }
}

/// Builder for [`SttCorrector`].
#[derive(Default)]
pub struct SttCorrectorBuilder {
    config: CorrectorConfig,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<dyn VectorIndex>>,
}

impl SttCorrectorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: CorrectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `provider` instead of the one named in the configuration.
    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Use `index` instead of an in-memory index.
    pub fn with_vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Set the seed file.
    pub fn with_knowledge_base(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.knowledge_base = Some(path.into());
        self
    }

    /// Build the corrector and load its seed file, if any.
    pub async fn build(self) -> Result<SttCorrector> {
        self.config.validate()?;
        let config = self.config;

        let provider = match self.provider {
            Some(provider) => Some(provider),
            None => provider_from_config(&config.embedding)?,
        };
        let vectors = match provider.filter(|_| config.vector.enabled) {
            Some(provider) => {
                let index: Arc<dyn VectorIndex> = match self.index {
                    Some(index) => index,
                    None => Arc::new(InMemoryVectorIndex::adaptive()),
                };
                Some(Arc::new(
                    VectorRetriever::new(provider, index).with_config(&config.vector),
                ))
            }
            None => None,
        };

        let knowledge = Arc::new(KnowledgeBase::new());
        let engine =
            CorrectionEngine::from_config(Arc::clone(&knowledge), &config, vectors.clone());
        let ingestor = KnowledgeIngestor::new(Arc::clone(&knowledge), vectors.clone());
        info!(
            "corrector ready (stages: {:?}, embeddings: {})",
            engine.stages(),
            vectors.as_ref().map_or("disabled", |v| v.provider_name())
        );

        let corrector = SttCorrector {
            config,
            knowledge,
            engine,
            ingestor,
            vectors,
        };
        if let Some(path) = &corrector.config.knowledge_base {
            corrector.ingestor.load_seed_file(path).await?;
        }
        Ok(corrector)
    }
}

fn provider_from_config(config: &EmbeddingConfig) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    match config.provider {
        EmbeddingProviderType::None => Ok(None),
        EmbeddingProviderType::Hashing => Ok(Some(cached(
            HashingProvider::with_dimension(config.dimension),
            config.cache_max_entries,
        ))),
        EmbeddingProviderType::OpenAI => {
            let mut provider = OpenAIProvider::new();
            if let Some(base_url) = &config.base_url {
                provider = provider.with_base_url(base_url.as_str());
            }
            if let Some(model) = &config.model {
                provider = provider.with_model(model.as_str());
            }
            if !provider.is_available() {
                return Err(CorrectorError::Config(
                    "openai embeddings need OPENAI_API_KEY or embedding.base_url".to_string(),
                ));
            }
            Ok(Some(cached(provider, config.cache_max_entries)))
        }
    }
}

fn cached<P>(provider: P, max_entries: usize) -> Arc<dyn EmbeddingProvider>
where
    P: EmbeddingProvider + 'static,
{
    if max_entries == 0 {
        Arc::new(provider)
    } else {
        Arc::new(CachedProvider::new(provider, EmbeddingCache::new(max_entries)))
    }
}
