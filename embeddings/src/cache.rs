//! Embedding cache to avoid re-embedding repeated inputs.
//!
//! STT front ends tend to send the same short utterances over and over, so
//! a small LRU in front of a remote provider removes most round trips.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::Embedding;
use crate::error::Result;
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};

/// Bounded LRU of `(model, text) -> embedding`.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<(String, String), Embedding>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    /// Create a cache holding at most `max_entries` embeddings (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            max_entries: capacity.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get an embedding from the cache, marking it recently used.
    pub async fn get(&self, text: &str, model: &str) -> Option<Embedding> {
        let key = (model.to_string(), text.to_string());
        let found = self.entries.lock().await.get(&key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Put an embedding in the cache, evicting the least recently used one
    /// when full.
    pub async fn put(&self, text: &str, model: &str, embedding: Embedding) {
        let evicted = self
            .entries
            .lock()
            .await
            .push((model.to_string(), text.to_string()), embedding);
        if let Some(((_, old_text), _)) = evicted.filter(|((_, old), _)| old != text) {
            debug!("Evicted cached embedding for {old_text:?}");
        }
    }

    /// Clear the entire cache.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.lock().await.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size.
    pub max_entries: usize,

    /// Lookups answered from the cache.
    pub hits: u64,

    /// Lookups that went to the provider.
    pub misses: u64,
}

/// A provider wrapper that answers repeated requests from an [`EmbeddingCache`].
pub struct CachedProvider<P> {
    provider: P,
    cache: EmbeddingCache,
}

impl<P> CachedProvider<P>
where
    P: EmbeddingProvider,
{
    /// Create a new cached provider.
    pub fn new(provider: P, cache: EmbeddingCache) -> Self {
        Self { provider, cache }
    }

    /// Get the underlying cache.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl<P> EmbeddingProvider for CachedProvider<P>
where
    P: EmbeddingProvider,
{
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn default_model(&self) -> &str {
        self.provider.default_model()
    }

    fn default_dimension(&self) -> usize {
        self.provider.default_dimension()
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string());

        if let Some(embedding) = self.cache.get(&request.text, &model).await {
            debug!("Cache hit for embedding");
            return Ok(EmbeddingResponse {
                dimension: embedding.len(),
                embedding,
                model,
                tokens_used: None,
            });
        }

        let text = request.text.clone();
        let response = self.provider.embed(request).await?;
        self.cache
            .put(&text, &model, response.embedding.clone())
            .await;

        Ok(response)
    }

    fn is_available(&self) -> bool {
        self.provider.is_available()
    }
}
