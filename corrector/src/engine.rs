//! The correction engine: an ordered list of matching stages.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;

use crate::config::CorrectorConfig;
use crate::exact::ExactMatcher;
use crate::fuzzy::{FuzzyHit, FuzzyMatcher};
use crate::knowledge::{KnowledgeBase, KnowledgeSnapshot};
use crate::normalize::{Span, Utterance};
use crate::types::{CorrectionCandidate, CorrectionMethod, CorrectionResult};
use crate::vector::{VectorMatcher, VectorRetriever};

/// What a stage found for an utterance.
#[derive(Debug, Clone)]
pub struct StageMatch {
    pub method: CorrectionMethod,

    /// Tokens to replace with the top candidate's phrase. `None` replaces the
    /// whole input.
    pub span: Option<Span>,

    pub confidence: f32,

    /// Best first; never empty.
    pub candidates: Vec<CorrectionCandidate>,

    /// Whether the top candidate should be applied or only reported.
    pub apply: bool,
}

/// One matching strategy.
///
/// Stages run in order and the first one returning a match decides the
/// result.
#[async_trait]
pub trait Matcher: Send + Sync {
    fn method(&self) -> CorrectionMethod;

    async fn attempt(
        &self,
        utterance: &Utterance<'_>,
        snapshot: &KnowledgeSnapshot,
    ) -> Option<StageMatch>;
}

/// Runs the matching stages against the latest knowledge snapshot.
pub struct CorrectionEngine {
    knowledge: Arc<KnowledgeBase>,
    matchers: Vec<Box<dyn Matcher>>,

    /// Window matcher used by [`CorrectionEngine::correct_plain`]. `None`
    /// restricts plain corrections to exact windows.
    plain_fuzzy: Option<FuzzyMatcher>,
}

impl CorrectionEngine {
    /// An engine without stages; add them with [`CorrectionEngine::with_matcher`].
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            knowledge,
            matchers: Vec::new(),
            plain_fuzzy: None,
        }
    }

    /// Exact, then fuzzy (if enabled), then vector (if a retriever is given
    /// and the stage is enabled).
    pub fn from_config(
        knowledge: Arc<KnowledgeBase>,
        config: &CorrectorConfig,
        vectors: Option<Arc<VectorRetriever>>,
    ) -> Self {
        let mut engine = Self::new(knowledge).with_matcher(ExactMatcher::new());
        if config.fuzzy.enabled {
            let fuzzy = FuzzyMatcher::from_config(&config.fuzzy);
            engine = engine.with_matcher(fuzzy.clone()).with_plain_fuzzy(fuzzy);
        }
        if let Some(retriever) = vectors.filter(|_| config.vector.enabled) {
            engine = engine.with_matcher(VectorMatcher::new(retriever, &config.vector));
        }
        engine
    }

    /// Append a stage.
    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    pub fn with_plain_fuzzy(mut self, fuzzy: FuzzyMatcher) -> Self {
        self.plain_fuzzy = Some(fuzzy);
        self
    }

    /// Methods of the configured stages, in order.
    pub fn stages(&self) -> Vec<CorrectionMethod> {
        self.matchers.iter().map(|m| m.method()).collect()
    }

    /// Correct one input. Never fails; an input nothing matches comes back
    /// unchanged with method `none`.
    pub async fn correct(&self, text: &str) -> CorrectionResult {
        let utterance = Utterance::new(text);
        if utterance.is_empty() {
            return CorrectionResult::unchanged(text);
        }

        let snapshot = self.knowledge.snapshot().await;
        for matcher in &self.matchers {
            if let Some(stage) = matcher.attempt(&utterance, &snapshot).await {
                return finish(&utterance, stage);
            }
        }

        debug!("no correction for {text:?}");
        CorrectionResult::unchanged(text)
    }

    /// Correct several inputs concurrently, preserving order.
    pub async fn correct_batch<S>(&self, texts: &[S]) -> Vec<CorrectionResult>
    where
        S: AsRef<str> + Sync,
    {
        join_all(texts.iter().map(|text| self.correct(text.as_ref()))).await
    }

    /// Replace every matching window of the input, not only the best one.
    ///
    /// Exact windows are taken first, longest first and left to right. The
    /// remaining tokens then take fuzzy hits in rank order. A window never
    /// overlaps an earlier replacement. Falls back to
    /// [`CorrectionEngine::correct`] when no window matches.
    pub async fn correct_plain(&self, text: &str) -> CorrectionResult {
        let utterance = Utterance::new(text);
        if utterance.is_empty() {
            return CorrectionResult::unchanged(text);
        }

        let snapshot = self.knowledge.snapshot().await;
        let longest = snapshot.max_mistake_tokens().min(utterance.len());

        let mut taken: Vec<(Span, CorrectionCandidate)> = Vec::new();
        for len in (1..=longest).rev() {
            for span in utterance.windows(len) {
                if taken.iter().any(|(t, _)| t.overlaps(&span)) {
                    continue;
                }
                if let Some(candidate) = exact_window(&utterance, span, &snapshot) {
                    taken.push((span, candidate));
                }
            }
        }
        let any_exact = !taken.is_empty();

        if let Some(fuzzy) = &self.plain_fuzzy {
            let mut hits: Vec<FuzzyHit> = (1..=fuzzy.max_window().min(utterance.len()))
                .flat_map(|len| utterance.windows(len))
                .filter(|span| !taken.iter().any(|(t, _)| t.overlaps(span)))
                .filter_map(|span| fuzzy.best_in_window(&utterance, span, &snapshot))
                .collect();
            hits.sort_by(|a, b| b.rank(a));
            for hit in hits {
                if taken.iter().any(|(t, _)| t.overlaps(&hit.span)) {
                    continue;
                }
                let raw = utterance.raw_window(hit.span);
                taken.push((hit.span, CorrectionCandidate::from_entry(&hit.entry, raw, hit.score)));
            }
        }

        if taken.is_empty() {
            return self.correct(text).await;
        }

        taken.sort_by_key(|(span, _)| span.start);
        let replacements: Vec<(Span, &str)> = taken
            .iter()
            .map(|(span, c)| (*span, c.correct_phrase.as_str()))
            .collect();
        let corrected_text = utterance.substitute_all(&replacements);
        let confidence = taken
            .iter()
            .map(|(_, c)| c.similarity)
            .fold(1.0_f32, f32::min);
        let method = if any_exact {
            CorrectionMethod::DirectMatch
        } else {
            CorrectionMethod::NgramFuzzy
        };
        debug!("plain correction replaced {} spans", taken.len());

        CorrectionResult {
            input_text: text.to_string(),
            correction_made: corrected_text != text,
            corrected_text,
            method,
            confidence,
            candidates: taken.into_iter().map(|(_, c)| c).collect(),
        }
    }
}

impl std::fmt::Debug for CorrectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrectionEngine")
            .field("stages", &self.stages())
            .field("plain_fuzzy", &self.plain_fuzzy)
            .finish_non_exhaustive()
    }
}

fn exact_window(
    utterance: &Utterance<'_>,
    span: Span,
    snapshot: &KnowledgeSnapshot,
) -> Option<CorrectionCandidate> {
    let entry = snapshot.lookup(&utterance.window(span))?;
    let raw = utterance.raw_window(span);
    (raw != entry.correct_phrase).then(|| CorrectionCandidate::from_entry(entry, raw, 1.0))
}

/// Build the result for the stage that matched.
fn finish(utterance: &Utterance<'_>, stage: StageMatch) -> CorrectionResult {
    let input = utterance.input();
    let corrected_text = match (stage.apply, stage.candidates.first()) {
        (true, Some(top)) => match stage.span {
            Some(span) => utterance.substitute(span, &top.correct_phrase),
            None => top.correct_phrase.clone(),
        },
        _ => input.to_string(),
    };

    let mut seen = HashSet::new();
    let candidates = stage
        .candidates
        .into_iter()
        .filter(|c| seen.insert(c.entry_id))
        .collect();

    CorrectionResult {
        input_text: input.to_string(),
        correction_made: stage.apply && corrected_text != input,
        corrected_text,
        method: stage.method,
        confidence: stage.confidence.clamp(0.0, 1.0),
        candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{EntryId, NewCorrection};
    use pretty_assertions::assert_eq;

    async fn knowledge(corrections: Vec<NewCorrection>) -> Arc<KnowledgeBase> {
        let base = Arc::new(KnowledgeBase::new());
        {
            let mut writer = base.writer().await;
            for correction in corrections {
                let id = writer.allocate_id();
                let entry = correction.validate().unwrap().into_entry(id);
                let next = writer.current().await.with_entry(entry).unwrap();
                writer.publish(next).await;
            }
        }
        base
    }

    async fn engine(corrections: Vec<NewCorrection>) -> CorrectionEngine {
        let config = CorrectorConfig::default();
        CorrectionEngine::from_config(knowledge(corrections).await, &config, None)
    }

    /// Always reports one fixed candidate.
    struct FixedMatcher {
        apply: bool,
    }

    #[async_trait]
    impl Matcher for FixedMatcher {
        fn method(&self) -> CorrectionMethod {
            CorrectionMethod::VectorSimilarity
        }

        async fn attempt(
            &self,
            _utterance: &Utterance<'_>,
            snapshot: &KnowledgeSnapshot,
        ) -> Option<StageMatch> {
            let entry = snapshot.entries().next()?;
            Some(StageMatch {
                method: CorrectionMethod::VectorSimilarity,
                span: None,
                confidence: 0.5,
                candidates: vec![CorrectionCandidate::from_entry(entry, "start eating", 0.5)],
                apply: self.apply,
            })
        }
    }

    #[test]
    fn test_default_stage_order() {
        let engine = CorrectionEngine::from_config(
            Arc::new(KnowledgeBase::new()),
            &CorrectorConfig::default(),
            None,
        );
        assert_eq!(
            engine.stages(),
            vec![CorrectionMethod::DirectMatch, CorrectionMethod::NgramFuzzy]
        );
    }

    #[tokio::test]
    async fn test_blank_input_is_noop() {
        let engine = engine(vec![NewCorrection::new("start meeting", ["start eating"])]).await;
        for text in ["", "   ", "\t\n"] {
            let result = engine.correct(text).await;
            assert_eq!(result, CorrectionResult::unchanged(text));
        }
    }

    #[tokio::test]
    async fn test_exact_window_keeps_surrounding_text() {
        let engine = engine(vec![NewCorrection::new("start meeting", ["start eating"])]).await;
        let result = engine.correct("Please start eating now.").await;

        assert_eq!(result.corrected_text, "Please start meeting now.");
        assert_eq!(result.method, CorrectionMethod::DirectMatch);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.candidates[0].matched_text, "start eating");
        assert!(result.correction_made);
    }

    #[tokio::test]
    async fn test_report_only_stage_leaves_text() {
        let engine = CorrectionEngine::new(
            knowledge(vec![NewCorrection::new("start meeting", ["start eating"])]).await,
        )
        .with_matcher(FixedMatcher { apply: false });

        let result = engine.correct("something else").await;
        assert_eq!(result.corrected_text, "something else");
        assert_eq!(result.method, CorrectionMethod::VectorSimilarity);
        assert!(!result.correction_made);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.confidence, 0.5);
    }

    #[tokio::test]
    async fn test_applied_stage_without_span_replaces_input() {
        let engine = CorrectionEngine::new(
            knowledge(vec![NewCorrection::new("start meeting", ["start eating"])]).await,
        )
        .with_matcher(FixedMatcher { apply: true });

        let result = engine.correct("something else").await;
        assert_eq!(result.corrected_text, "start meeting");
        assert!(result.correction_made);
    }

    #[tokio::test]
    async fn test_plain_replaces_several_spans() {
        let engine = engine(vec![
            NewCorrection::new("start meeting", ["start eating"]),
            NewCorrection::new("three", ["tree"]),
        ])
        .await;

        let result = engine.correct_plain("start eating at tree pm").await;
        assert_eq!(result.corrected_text, "start meeting at three pm");
        assert_eq!(result.method, CorrectionMethod::DirectMatch);
        let ids: Vec<EntryId> = result.candidates.iter().map(|c| c.entry_id).collect();
        assert_eq!(ids, vec![EntryId(1), EntryId(2)]);
    }

    #[tokio::test]
    async fn test_plain_uses_fuzzy_windows() {
        let engine = engine(vec![NewCorrection::new("start meeting", ["start eating"])]).await;

        let result = engine.correct_plain("lets strt eatng now").await;
        assert_eq!(result.corrected_text, "lets start meeting now");
        assert_eq!(result.method, CorrectionMethod::NgramFuzzy);
        assert!(result.confidence < 1.0);
    }

    #[tokio::test]
    async fn test_plain_without_match_is_unchanged() {
        let engine = engine(vec![NewCorrection::new("start meeting", ["start eating"])]).await;
        let result = engine.correct_plain("completely unrelated words").await;
        assert_eq!(result, CorrectionResult::unchanged("completely unrelated words"));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let engine = engine(vec![NewCorrection::new("start meeting", ["start eating"])]).await;
        let results = engine
            .correct_batch(&["start eating", "", "hello"])
            .await;

        let corrected: Vec<&str> = results.iter().map(|r| r.corrected_text.as_str()).collect();
        assert_eq!(corrected, vec!["start meeting", "", "hello"]);
    }
}
