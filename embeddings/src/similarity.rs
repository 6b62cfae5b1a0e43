//! Similarity computation for embeddings.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, Result};

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0; zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a = magnitude(a);
    let magnitude_b = magnitude(b);

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok(dot_product / (magnitude_a * magnitude_b))
}

/// Clamp a cosine score onto `[0, 1]`. Negative and NaN scores become zero.
pub fn to_unit_interval(score: f32) -> f32 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalize an embedding to unit length.
pub fn normalize(embedding: &mut [f32]) {
    let magnitude = magnitude(embedding);
    if magnitude > 0.0 {
        for x in embedding.iter_mut() {
            *x /= magnitude;
        }
    }
}

/// A similarity search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// ID of the matched item.
    pub id: String,

    /// Similarity score.
    pub score: f32,

    /// Additional metadata.
    pub metadata: Option<serde_json::Value>,
}

impl SimilarityResult {
    /// Create a new similarity result.
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
            metadata: None,
        }
    }

    /// Add metadata to the result.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Find the top-k most similar embeddings.
///
/// Ties are broken by id so repeated queries return the same order.
pub fn find_top_k<'a, I>(query: &[f32], candidates: I, k: usize) -> Result<Vec<SimilarityResult>>
where
    I: IntoIterator<Item = (&'a str, &'a [f32])>,
{
    let mut scores: Vec<(OrderedFloat<f32>, &str)> = Vec::new();

    for (id, embedding) in candidates {
        let score = cosine_similarity(query, embedding)?;
        scores.push((OrderedFloat(score), id));
    }

    scores.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    Ok(scores
        .into_iter()
        .take(k)
        .map(|(score, id)| SimilarityResult::new(id, score.0))
        .collect())
}
