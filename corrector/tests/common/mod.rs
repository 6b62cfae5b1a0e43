#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use stt_corrector::{CorrectorConfig, FuzzyConfig, NewCorrection, SttCorrector, VectorConfig};
use stt_embeddings::{
    Embedding, EmbeddingError, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse,
    InMemoryVectorIndex, SimilarityResult, VectorIndex,
};

pub fn meeting() -> NewCorrection {
    NewCorrection::new("start meeting", ["start eating", "start meting"])
        .with_context("calendar commands")
        .with_category("meetings")
}

pub fn fuzzy_config(min_similarity: f32) -> CorrectorConfig {
    CorrectorConfig::default().with_fuzzy(FuzzyConfig {
        min_similarity,
        ..FuzzyConfig::default()
    })
}

pub fn short_timeouts(config: CorrectorConfig) -> CorrectorConfig {
    let vector = VectorConfig {
        embed_timeout_ms: 50,
        index_timeout_ms: 50,
        ..config.vector.clone()
    };
    config.with_vector(vector)
}

pub async fn corrector_with(corrections: Vec<NewCorrection>) -> SttCorrector {
    let corrector = SttCorrector::builder().build().await.unwrap();
    for correction in corrections {
        corrector.add_correction(correction).await.unwrap();
    }
    corrector
}

/// Embeds known texts to fixed vectors and everything else to `fallback`.
pub struct StaticProvider {
    vectors: HashMap<String, Embedding>,
    fallback: Embedding,
}

impl StaticProvider {
    pub fn new(fallback: Embedding) -> Self {
        Self {
            vectors: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, text: &str, vector: Embedding) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn default_model(&self) -> &str {
        "static"
    }

    fn default_dimension(&self) -> usize {
        self.fallback.len()
    }

    async fn embed(&self, request: EmbeddingRequest) -> stt_embeddings::Result<EmbeddingResponse> {
        let embedding = self
            .vectors
            .get(&request.text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: "static".to_string(),
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// An embedding provider that never answers in time.
pub struct StalledProvider;

#[async_trait]
impl EmbeddingProvider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    fn default_model(&self) -> &str {
        "stalled"
    }

    fn default_dimension(&self) -> usize {
        2
    }

    async fn embed(&self, _request: EmbeddingRequest) -> stt_embeddings::Result<EmbeddingResponse> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(EmbeddingError::ApiRequest("unreachable".to_string()))
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// In-memory index whose writes and deletes fail while `healthy` is false.
pub struct FlakyIndex {
    inner: InMemoryVectorIndex,
    healthy: AtomicBool,
}

impl FlakyIndex {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryVectorIndex::adaptive(),
            healthy: AtomicBool::new(false),
        })
    }

    pub fn recover(&self) {
        self.healthy.store(true, Ordering::SeqCst);
    }

    pub fn go_offline(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> stt_embeddings::Result<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EmbeddingError::Index("index offline".to_string()))
        }
    }
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    async fn upsert(
        &self,
        id: &str,
        vector: Embedding,
        metadata: serde_json::Value,
    ) -> stt_embeddings::Result<()> {
        self.check()?;
        self.inner.upsert(id, vector, metadata).await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> stt_embeddings::Result<Vec<SimilarityResult>> {
        self.inner.query(vector, top_k).await
    }

    async fn delete(&self, id: &str) -> stt_embeddings::Result<bool> {
        self.check()?;
        self.inner.delete(id).await
    }

    async fn len(&self) -> usize {
        self.inner.len().await
    }
}

/// An index whose queries hang.
pub struct StalledIndex {
    inner: InMemoryVectorIndex,
}

impl StalledIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryVectorIndex::adaptive(),
        })
    }
}

#[async_trait]
impl VectorIndex for StalledIndex {
    async fn upsert(
        &self,
        id: &str,
        vector: Embedding,
        metadata: serde_json::Value,
    ) -> stt_embeddings::Result<()> {
        self.inner.upsert(id, vector, metadata).await
    }

    async fn query(
        &self,
        _vector: &[f32],
        _top_k: usize,
    ) -> stt_embeddings::Result<Vec<SimilarityResult>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }

    async fn delete(&self, id: &str) -> stt_embeddings::Result<bool> {
        self.inner.delete(id).await
    }

    async fn len(&self) -> usize {
        self.inner.len().await
    }
}
