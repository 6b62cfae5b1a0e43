//! Error types for the correction engine.

use thiserror::Error;

use crate::knowledge::EntryId;

/// Result type alias for correction operations.
pub type Result<T> = std::result::Result<T, CorrectorError>;

/// Errors that can occur in the correction engine.
#[derive(Error, Debug)]
pub enum CorrectorError {
    /// Malformed knowledge-base request. Never retried automatically.
    #[error("validation error: {0}")]
    Validation(String),

    /// A mistake string is already claimed by another entry.
    #[error("mistake {mistake:?} already belongs to entry {entry_id}")]
    Conflict { mistake: String, entry_id: EntryId },

    /// An embedding or vector-index call exceeded its deadline.
    #[error("{operation} timed out after {timeout_ms}ms")]
    RetrievalTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Entry not found.
    #[error("knowledge entry not found: {0}")]
    NotFound(EntryId),

    /// Embedding provider or vector index error.
    #[error("embedding error: {0}")]
    Embedding(#[from] stt_embeddings::EmbeddingError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Seed file could not be parsed.
    #[error("invalid knowledge base seed: {0}")]
    Seed(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
