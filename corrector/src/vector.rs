//! Embedding-based retrieval of knowledge entries.
//!
//! Each mistake string of an entry is stored in the vector index under the id
//! `"{entry_id}:{ordinal}"` with `{entry_id, mistake}` metadata. Hits are
//! resolved back through the current snapshot, so vectors left behind by a
//! removed entry or a failed cleanup are ignored.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, warn};

use stt_embeddings::{
    Embedding, EmbeddingProvider, EmbeddingRequest, SimilarityResult, VectorIndex,
    to_unit_interval,
};

use crate::config::VectorConfig;
use crate::engine::{Matcher, StageMatch};
use crate::error::{CorrectorError, Result};
use crate::knowledge::{EntryId, KnowledgeEntry, KnowledgeSnapshot};
use crate::normalize::Utterance;
use crate::types::{CorrectionCandidate, CorrectionMethod};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Vector-index id of the `ordinal`-th mistake of `entry`.
pub fn vector_id(entry: EntryId, ordinal: usize) -> String {
    format!("{entry}:{ordinal}")
}

/// Vector-index ids of the mistakes of `entry`, starting at ordinal `from`.
pub fn entry_vector_ids(entry: &KnowledgeEntry, from: usize) -> Vec<String> {
    (from..entry.normalized_mistakes().len())
        .map(|ordinal| vector_id(entry.id, ordinal))
        .collect()
}

/// Embedding provider plus vector index, every call under a deadline.
pub struct VectorRetriever {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    embed_timeout: Duration,
    index_timeout: Duration,
}

impl VectorRetriever {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            provider,
            index,
            embed_timeout: DEFAULT_TIMEOUT,
            index_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, embed: Duration, index: Duration) -> Self {
        self.embed_timeout = embed;
        self.index_timeout = index;
        self
    }

    pub fn with_config(self, config: &VectorConfig) -> Self {
        self.with_timeouts(config.embed_timeout(), config.index_timeout())
    }

    /// Name of the embedding provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Number of vectors held by the index.
    pub async fn stored_vectors(&self) -> usize {
        self.index.len().await
    }

    /// Embed `text` with the configured provider.
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        let response = deadline(
            "embedding",
            self.embed_timeout,
            self.provider.embed(EmbeddingRequest::new(text)),
        )
        .await?;
        Ok(response.embedding)
    }

    /// Nearest entries to `normalized`, best first, one candidate per entry.
    pub async fn retrieve(
        &self,
        normalized: &str,
        snapshot: &KnowledgeSnapshot,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<CorrectionCandidate>> {
        if normalized.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embed(normalized).await?;
        let hits = deadline(
            "vector query",
            self.index_timeout,
            self.index.query(&query, top_k),
        )
        .await?;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for hit in hits {
            let similarity = to_unit_interval(hit.score);
            if similarity < min_similarity {
                continue;
            }
            let Some((entry, mistake)) = resolve(&hit, snapshot) else {
                debug!("skipping stale vector {}", hit.id);
                continue;
            };
            if seen.insert(entry.id) {
                candidates.push(CorrectionCandidate::from_entry(entry, mistake, similarity));
            }
        }

        candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Ok(candidates)
    }

    /// Embed and upsert every mistake of `entry`.
    pub async fn index_entry(&self, entry: &KnowledgeEntry) -> Result<()> {
        for (ordinal, key) in entry.normalized_mistakes().iter().enumerate() {
            let vector = self.embed(key).await?;
            let metadata = json!({ "entry_id": entry.id, "mistake": key });
            deadline(
                "vector upsert",
                self.index_timeout,
                self.index.upsert(&vector_id(entry.id, ordinal), vector, metadata),
            )
            .await?;
        }
        debug!(
            "indexed {} mistake vectors for entry {}",
            entry.normalized_mistakes().len(),
            entry.id
        );
        Ok(())
    }

    /// Delete every vector of `entry`.
    pub async fn unindex_entry(&self, entry: &KnowledgeEntry) -> Result<()> {
        for id in entry_vector_ids(entry, 0) {
            self.delete_vector(&id).await?;
        }
        Ok(())
    }

    /// Delete the vector stored under `id`. Returns whether it existed.
    pub async fn delete_vector(&self, id: &str) -> Result<bool> {
        deadline("vector delete", self.index_timeout, self.index.delete(id)).await
    }
}

impl std::fmt::Debug for VectorRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorRetriever")
            .field("provider", &self.provider.name())
            .field("embed_timeout", &self.embed_timeout)
            .field("index_timeout", &self.index_timeout)
            .finish_non_exhaustive()
    }
}

async fn deadline<T, F>(operation: &'static str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = stt_embeddings::Result<T>>,
{
    match timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CorrectorError::RetrievalTimeout {
            operation,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Entry and mistake a hit points at, if both still exist.
fn resolve<'a>(
    hit: &SimilarityResult,
    snapshot: &'a KnowledgeSnapshot,
) -> Option<(&'a Arc<KnowledgeEntry>, &'a str)> {
    let metadata = hit.metadata.as_ref()?;
    let entry_id = metadata.get("entry_id")?.as_u64().map(EntryId)?;
    let key = metadata.get("mistake")?.as_str()?;

    let entry = snapshot.get(entry_id)?;
    let mistake = entry.mistake_for_key(key)?;
    Some((entry, mistake))
}

/// Third stage: nearest mistake by embedding similarity.
///
/// Hits at or above `apply_threshold` are applied; weaker hits above
/// `min_similarity` are returned for inspection only. Input that already is a
/// correct phrase is never rewritten.
#[derive(Debug)]
pub struct VectorMatcher {
    retriever: Arc<VectorRetriever>,
    top_k: usize,
    min_similarity: f32,
    apply_threshold: f32,
}

impl VectorMatcher {
    pub fn new(retriever: Arc<VectorRetriever>, config: &VectorConfig) -> Self {
        Self {
            retriever,
            top_k: config.top_k,
            min_similarity: config.min_similarity,
            apply_threshold: config.apply_threshold,
        }
    }
}

#[async_trait]
impl Matcher for VectorMatcher {
    fn method(&self) -> CorrectionMethod {
        CorrectionMethod::VectorSimilarity
    }

    async fn attempt(
        &self,
        utterance: &Utterance<'_>,
        snapshot: &KnowledgeSnapshot,
    ) -> Option<StageMatch> {
        let normalized = utterance.normalized();
        if snapshot.is_correct_phrase(&normalized) {
            debug!("vector stage skipped: {normalized:?} is already a correct phrase");
            return None;
        }
        let candidates = match self
            .retriever
            .retrieve(&normalized, snapshot, self.top_k, self.min_similarity)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("vector stage skipped: {e}");
                return None;
            }
        };

        let confidence = candidates.first()?.similarity;
        let apply = confidence >= self.apply_threshold;
        debug!("vector match {confidence:.3} (apply: {apply})");

        Some(StageMatch {
            method: CorrectionMethod::VectorSimilarity,
            span: None,
            confidence,
            candidates,
            apply,
        })
    }
}
