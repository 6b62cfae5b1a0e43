//! Errors raised by embedding providers and vector indexes.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbeddingError>;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// No API key or endpoint for the provider.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    #[error("embedding request failed: {0}")]
    ApiRequest(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// A vector does not match the dimension of the index or query.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("cannot embed empty text")]
    EmptyInput,

    /// The vector index rejected a read or write.
    #[error("vector index error: {0}")]
    Index(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
