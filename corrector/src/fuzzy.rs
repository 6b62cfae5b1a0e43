//! N-gram fuzzy matching against mistake strings.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::FuzzyConfig;
use crate::engine::{Matcher, StageMatch};
use crate::knowledge::{KnowledgeEntry, KnowledgeSnapshot};
use crate::normalize::{Span, Utterance};
use crate::types::{CorrectionCandidate, CorrectionMethod};

/// Normalized Levenshtein similarity in `[0, 1]`.
///
/// One minus the character edit distance divided by the longer length.
pub fn similarity(a: &str, b: &str) -> f32 {
    strsim::normalized_levenshtein(a, b) as f32
}

/// Highest similarity two strings of these character lengths can reach.
fn length_bound(a: usize, b: usize) -> f32 {
    let longer = a.max(b);
    if longer == 0 {
        return 1.0;
    }
    a.min(b) as f32 / longer as f32
}

/// Best scoring window and entry.
#[derive(Debug, Clone)]
pub struct FuzzyHit {
    pub span: Span,
    pub entry: Arc<KnowledgeEntry>,
    pub score: f32,
}

impl FuzzyHit {
    /// Higher score, then longer window, then earlier position, then lower id.
    pub fn rank(&self, other: &FuzzyHit) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.span.len().cmp(&other.span.len()))
            .then_with(|| other.span.start.cmp(&self.span.start))
            .then_with(|| other.entry.id.cmp(&self.entry.id))
    }
}

/// Second stage: closest token window to any mistake string.
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    max_window: usize,
    min_similarity: f32,
}

impl FuzzyMatcher {
    pub fn new(max_window: usize, min_similarity: f32) -> Self {
        Self {
            max_window: max_window.max(1),
            min_similarity,
        }
    }

    pub fn from_config(config: &FuzzyConfig) -> Self {
        Self::new(config.max_window, config.min_similarity)
    }

    pub fn max_window(&self) -> usize {
        self.max_window
    }

    pub fn min_similarity(&self) -> f32 {
        self.min_similarity
    }

    /// Best entry for a single window, if any clears the threshold.
    ///
    /// Windows that already read as an entry's correct phrase never match
    /// that entry.
    pub fn best_in_window(
        &self,
        utterance: &Utterance<'_>,
        span: Span,
        snapshot: &KnowledgeSnapshot,
    ) -> Option<FuzzyHit> {
        let window = utterance.window(span);
        let window_chars = window.chars().count();
        let mut best: Option<FuzzyHit> = None;

        for entry in snapshot.entries() {
            if window == entry.normalized_phrase() {
                continue;
            }
            for mistake in entry.normalized_mistakes() {
                if length_bound(window_chars, mistake.chars().count()) < self.min_similarity {
                    continue;
                }
                let score = similarity(&window, mistake);
                if score < self.min_similarity {
                    continue;
                }
                if best.as_ref().is_none_or(|b| score > b.score) {
                    best = Some(FuzzyHit {
                        span,
                        entry: Arc::clone(entry),
                        score,
                    });
                }
            }
        }
        best
    }

    /// Best window of up to `max_window` tokens over the whole utterance.
    pub fn find(
        &self,
        utterance: &Utterance<'_>,
        snapshot: &KnowledgeSnapshot,
    ) -> Option<FuzzyHit> {
        let longest = self.max_window.min(utterance.len());
        let mut best: Option<FuzzyHit> = None;

        for len in 1..=longest {
            for span in utterance.windows(len) {
                let Some(hit) = self.best_in_window(utterance, span, snapshot) else {
                    continue;
                };
                if best.as_ref().is_none_or(|b| hit.rank(b).is_gt()) {
                    best = Some(hit);
                }
            }
        }
        best
    }
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self::from_config(&FuzzyConfig::default())
    }
}

#[async_trait]
impl Matcher for FuzzyMatcher {
    fn method(&self) -> CorrectionMethod {
        CorrectionMethod::NgramFuzzy
    }

    async fn attempt(
        &self,
        utterance: &Utterance<'_>,
        snapshot: &KnowledgeSnapshot,
    ) -> Option<StageMatch> {
        let hit = self.find(utterance, snapshot)?;
        debug!(
            "fuzzy match {:.3} on tokens {}..{} (entry {})",
            hit.score, hit.span.start, hit.span.end, hit.entry.id
        );

        let candidate =
            CorrectionCandidate::from_entry(&hit.entry, utterance.raw_window(hit.span), hit.score);
        Some(StageMatch {
            method: CorrectionMethod::NgramFuzzy,
            span: Some(hit.span),
            confidence: hit.score,
            candidates: vec![candidate],
            apply: true,
        })
    }
}
