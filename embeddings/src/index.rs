//! Vector index for nearest-neighbour lookups.
//!
//! [`VectorIndex`] is the boundary the correction engine programs against;
//! persistence and eviction are the implementation's business. The crate
//! ships [`InMemoryVectorIndex`], a brute-force cosine index that is plenty
//! for knowledge bases of a few thousand mistake strings.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::{SimilarityResult, find_top_k, normalize};

/// Upsert/query contract of an external vector store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite the vector stored under `id`.
    async fn upsert(&self, id: &str, vector: Embedding, metadata: serde_json::Value) -> Result<()>;

    /// Return up to `top_k` stored vectors ordered by descending similarity.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SimilarityResult>>;

    /// Remove the vector stored under `id`. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Number of stored vectors.
    async fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// An entry in the similarity index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Unique identifier.
    pub id: String,

    /// The embedding vector (normalized).
    pub embedding: Embedding,

    /// Associated metadata.
    pub metadata: Option<serde_json::Value>,
}

/// A synchronous cosine-similarity index.
///
/// Vectors are normalized on insert. The dimension is either fixed up front
/// or adopted from the first vector added.
#[derive(Debug, Default)]
pub struct SimilarityIndex {
    entries: HashMap<String, IndexEntry>,
    dimension: Option<usize>,
}

impl SimilarityIndex {
    /// Create an index that only accepts vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimension: Some(dimension),
        }
    }

    /// Create an index whose dimension is fixed by the first vector added.
    pub fn adaptive() -> Self {
        Self::default()
    }

    /// The accepted dimension, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(EmbeddingError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    /// Add (or replace) an embedding.
    pub fn add(
        &mut self,
        id: impl Into<String>,
        mut embedding: Embedding,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let id = id.into();
        self.check_dimension(embedding.len())?;
        if self.dimension.is_none() {
            self.dimension = Some(embedding.len());
        }

        normalize(&mut embedding);
        debug!("Added embedding to index: {id}");
        self.entries.insert(
            id.clone(),
            IndexEntry {
                id,
                embedding,
                metadata,
            },
        );

        Ok(())
    }

    /// Remove an embedding from the index.
    pub fn remove(&mut self, id: &str) -> Option<IndexEntry> {
        self.entries.remove(id)
    }

    /// Get an embedding by ID.
    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    /// Check if an ID exists in the index.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Search for the `k` most similar embeddings.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SimilarityResult>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(query.len())?;

        let mut query = query.to_vec();
        normalize(&mut query);

        let candidates = self
            .entries
            .values()
            .map(|e| (e.id.as_str(), e.embedding.as_slice()));
        let mut results = find_top_k(&query, candidates, k)?;

        for result in &mut results {
            if let Some(entry) = self.entries.get(&result.id) {
                result.metadata = entry.metadata.clone();
            }
        }

        Ok(results)
    }
}

/// Thread-safe [`VectorIndex`] backed by a [`SimilarityIndex`].
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    inner: RwLock<SimilarityIndex>,
}

impl InMemoryVectorIndex {
    /// Create an index with a fixed dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: RwLock::new(SimilarityIndex::new(dimension)),
        }
    }

    /// Create an index that adopts the dimension of the first upsert.
    pub fn adaptive() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, id: &str, vector: Embedding, metadata: serde_json::Value) -> Result<()> {
        self.inner.write().await.add(id, vector, Some(metadata))
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<SimilarityResult>> {
        self.inner.read().await.search(vector, top_k)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.inner.write().await.remove(id).is_some())
    }

    async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}
