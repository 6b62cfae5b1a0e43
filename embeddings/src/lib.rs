//! # Embeddings
//!
//! Embedding generation and nearest-neighbour lookup for the STT corrector.
//! The correction engine treats both halves as external collaborators and
//! only talks to them through the traits defined here.
//!
//! ## Features
//!
//! - **Embedding Generation**: [`EmbeddingProvider`] with an OpenAI-compatible
//!   HTTP backend and a deterministic offline backend
//! - **Vector Index**: [`VectorIndex`] with an in-memory cosine implementation
//! - **Caching**: [`CachedProvider`] keeps recently embedded texts in an LRU
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► VectorIndex                │
//! │       │                                   │                     │
//! │       ▼                                   ▼                     │
//! │  OpenAI/Hashing/Cached             SimilarityIndex             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod index;
pub mod provider;
pub mod similarity;

pub use cache::{CacheStats, CachedProvider, EmbeddingCache};
pub use error::{EmbeddingError, Result};
pub use index::{InMemoryVectorIndex, SimilarityIndex, VectorIndex};
pub use provider::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, HashingProvider, OpenAIProvider,
};
pub use similarity::{SimilarityResult, cosine_similarity, to_unit_interval};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension used by [`HashingProvider`] when none is configured.
pub const DEFAULT_HASHING_DIMENSION: usize = 256;
