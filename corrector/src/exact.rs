//! Exact lookup of normalized mistake strings.

use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use crate::engine::{Matcher, StageMatch};
use crate::error::{CorrectorError, Result};
use crate::knowledge::{EntryId, KnowledgeSnapshot};
use crate::normalize::{Span, Utterance};
use crate::types::{CorrectionCandidate, CorrectionMethod};

/// Normalized mistake string to owning entry.
#[derive(Debug, Clone, Default)]
pub struct ExactIndex {
    keys: HashMap<String, EntryId>,
}

impl ExactIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, normalized: &str) -> Option<EntryId> {
        self.keys.get(normalized).copied()
    }

    /// Map `key` to `id`. Re-inserting an existing pair is a no-op.
    pub fn insert(&mut self, key: String, id: EntryId) -> Result<()> {
        match self.keys.get(&key) {
            Some(&owner) if owner != id => Err(CorrectorError::Conflict {
                mistake: key,
                entry_id: owner,
            }),
            Some(_) => Ok(()),
            None => {
                self.keys.insert(key, id);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<EntryId> {
        self.keys.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, EntryId)> {
        self.keys.iter().map(|(k, id)| (k.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// First stage: the whole utterance or any token window equals a mistake.
#[derive(Debug, Clone, Default)]
pub struct ExactMatcher;

impl ExactMatcher {
    pub fn new() -> Self {
        Self
    }

    /// All exact matches, one per entry, longest window first then leftmost.
    ///
    /// Windows whose raw text already reads as the correct phrase are
    /// skipped.
    pub fn find(
        &self,
        utterance: &Utterance<'_>,
        snapshot: &KnowledgeSnapshot,
    ) -> Vec<(Span, CorrectionCandidate)> {
        let longest = utterance.len().min(snapshot.max_mistake_tokens());
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for len in (1..=longest).rev() {
            for span in utterance.windows(len) {
                let Some(entry) = snapshot.lookup(&utterance.window(span)) else {
                    continue;
                };
                let raw = utterance.raw_window(span);
                if raw == entry.correct_phrase || !seen.insert(entry.id) {
                    continue;
                }
                found.push((span, CorrectionCandidate::from_entry(entry, raw, 1.0)));
            }
        }
        found
    }
}

#[async_trait]
impl Matcher for ExactMatcher {
    fn method(&self) -> CorrectionMethod {
        CorrectionMethod::DirectMatch
    }

    async fn attempt(
        &self,
        utterance: &Utterance<'_>,
        snapshot: &KnowledgeSnapshot,
    ) -> Option<StageMatch> {
        let found = self.find(utterance, snapshot);
        let span = found.first().map(|(span, _)| *span)?;
        debug!("exact match on {} of {} tokens", span.len(), utterance.len());

        Some(StageMatch {
            method: CorrectionMethod::DirectMatch,
            span: Some(span),
            confidence: 1.0,
            candidates: found.into_iter().map(|(_, candidate)| candidate).collect(),
            apply: true,
        })
    }
}
