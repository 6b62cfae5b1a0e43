//! Results and the request/response surface of the corrector.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::knowledge::{EntryId, KnowledgeEntry, NewCorrection};

/// Which stage produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMethod {
    DirectMatch,
    NgramFuzzy,
    VectorSimilarity,
    None,
}

impl CorrectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectMatch => "direct_match",
            Self::NgramFuzzy => "ngram_fuzzy",
            Self::VectorSimilarity => "vector_similarity",
            Self::None => "none",
        }
    }
}

impl fmt::Display for CorrectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A knowledge entry proposed for an input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionCandidate {
    pub entry_id: EntryId,
    pub correct_phrase: String,

    /// Input span that triggered the match, or the matched mistake for
    /// vector hits.
    pub matched_text: String,

    pub common_mistakes: Vec<String>,
    pub context: Option<String>,
    pub category: Option<String>,

    /// Match strength in `[0, 1]`.
    pub similarity: f32,
}

impl CorrectionCandidate {
    pub fn from_entry(
        entry: &KnowledgeEntry,
        matched_text: impl Into<String>,
        similarity: f32,
    ) -> Self {
        Self {
            entry_id: entry.id,
            correct_phrase: entry.correct_phrase.clone(),
            matched_text: matched_text.into(),
            common_mistakes: entry.common_mistakes.clone(),
            context: entry.context.clone(),
            category: entry.category.clone(),
            similarity,
        }
    }
}

/// Outcome of one correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResult {
    pub input_text: String,
    pub corrected_text: String,
    pub correction_made: bool,
    pub method: CorrectionMethod,
    pub confidence: f32,

    /// Best first.
    pub candidates: Vec<CorrectionCandidate>,
}

impl CorrectionResult {
    /// A result that leaves `input` as it is.
    pub fn unchanged(input: impl Into<String>) -> Self {
        let input = input.into();
        Self {
            corrected_text: input.clone(),
            input_text: input,
            correction_made: false,
            method: CorrectionMethod::None,
            confidence: 0.0,
            candidates: Vec::new(),
        }
    }

    /// The best candidate, if any.
    pub fn top_candidate(&self) -> Option<&CorrectionCandidate> {
        self.candidates.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRequest {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCorrectionRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCorrectionResponse {
    pub results: Vec<CorrectionResult>,
}

/// Plain-text variant of a correction response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainCorrectionResponse {
    pub corrected_text: String,
}

impl From<CorrectionResult> for PlainCorrectionResponse {
    fn from(result: CorrectionResult) -> Self {
        Self {
            corrected_text: result.corrected_text,
        }
    }
}

/// Knowledge-add request: `{correct_phrase, common_mistakes[], context?, category?}`.
pub type AddCorrectionRequest = NewCorrection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddCorrectionResponse {
    pub success: bool,
    pub entry_id: EntryId,
    pub vector_indexed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_error: Option<String>,
}

/// Entry counts and vector index health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub entries: usize,
    pub mistakes: usize,
    pub vector_indexed_entries: usize,
    pub vector_pending_entries: usize,
    pub vectors_stored: usize,

    /// Vectors of removed entries still waiting to be deleted.
    pub vectors_stale: usize,
    pub embedding_provider: Option<String>,
    pub vector_enabled: bool,
}
