//! Knowledge base entries and copy-on-write snapshots.
//!
//! A [`KnowledgeSnapshot`] holds the entries together with the exact index
//! built from their mistake strings, so the two can never disagree. Writers
//! build a new snapshot from the current one and publish it in a single swap;
//! readers keep whichever `Arc` they cloned for as long as they need it.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::error::{CorrectorError, Result};
use crate::exact::ExactIndex;
use crate::normalize::normalize;

/// Stable identifier of a knowledge entry. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A correction request before validation.
///
/// This is also the shape of one seed-file record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCorrection {
    pub correct_phrase: String,

    #[serde(default)]
    pub common_mistakes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl NewCorrection {
    pub fn new<I, S>(correct_phrase: impl Into<String>, common_mistakes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            correct_phrase: correct_phrase.into(),
            common_mistakes: common_mistakes.into_iter().map(Into::into).collect(),
            context: None,
            category: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Trim and de-duplicate the request, rejecting empty phrases and
    /// mistakes.
    pub(crate) fn validate(self) -> Result<ValidCorrection> {
        let correct_phrase = self.correct_phrase.trim().to_string();
        if correct_phrase.is_empty() {
            return Err(CorrectorError::Validation(
                "correct_phrase must not be empty".to_string(),
            ));
        }
        if self.common_mistakes.is_empty() {
            return Err(CorrectorError::Validation(
                "common_mistakes must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut mistakes = Vec::with_capacity(self.common_mistakes.len());
        for mistake in self.common_mistakes {
            let key = normalize(&mistake);
            if key.is_empty() {
                return Err(CorrectorError::Validation(format!(
                    "mistake {mistake:?} is empty after normalization"
                )));
            }
            if seen.insert(key.clone()) {
                mistakes.push(Mistake {
                    text: mistake.trim().to_string(),
                    key,
                });
            }
        }

        Ok(ValidCorrection {
            correct_phrase,
            mistakes,
            context: non_blank(self.context),
            category: non_blank(self.category),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A mistake string as given and in normalized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Mistake {
    pub text: String,
    pub key: String,
}

/// A validated [`NewCorrection`].
#[derive(Debug, Clone)]
pub(crate) struct ValidCorrection {
    pub correct_phrase: String,
    pub mistakes: Vec<Mistake>,
    pub context: Option<String>,
    pub category: Option<String>,
}

impl ValidCorrection {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.mistakes.iter().map(|m| m.key.as_str())
    }

    pub fn into_entry(self, id: EntryId) -> KnowledgeEntry {
        let (common_mistakes, normalized_mistakes): (Vec<String>, Vec<String>) =
            self.mistakes.into_iter().map(|m| (m.text, m.key)).unzip();
        KnowledgeEntry {
            id,
            normalized_phrase: normalize(&self.correct_phrase),
            correct_phrase: self.correct_phrase,
            common_mistakes,
            context: self.context,
            category: self.category,
            vector_indexed: false,
            normalized_mistakes,
        }
    }
}

/// One correction in the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeEntry {
    pub id: EntryId,
    pub correct_phrase: String,
    pub common_mistakes: Vec<String>,
    pub context: Option<String>,
    pub category: Option<String>,

    /// Whether every mistake has been upserted to the vector index.
    pub vector_indexed: bool,

    #[serde(skip)]
    normalized_mistakes: Vec<String>,

    #[serde(skip)]
    normalized_phrase: String,
}

impl KnowledgeEntry {
    /// Mistakes in normalized form, parallel to `common_mistakes`.
    pub fn normalized_mistakes(&self) -> &[String] {
        &self.normalized_mistakes
    }

    /// The correct phrase in normalized form.
    pub fn normalized_phrase(&self) -> &str {
        &self.normalized_phrase
    }

    /// Mistake as given, for a normalized key of this entry.
    pub fn mistake_for_key(&self, key: &str) -> Option<&str> {
        self.normalized_mistakes
            .iter()
            .position(|k| k == key)
            .map(|i| self.common_mistakes[i].as_str())
    }
}

/// An immutable view of the knowledge base.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeSnapshot {
    entries: BTreeMap<EntryId, Arc<KnowledgeEntry>>,
    exact: ExactIndex,
    max_mistake_tokens: usize,
}

impl KnowledgeSnapshot {
    pub fn get(&self, id: EntryId) -> Option<&Arc<KnowledgeEntry>> {
        self.entries.get(&id)
    }

    /// Entries in id order.
    pub fn entries(&self) -> impl Iterator<Item = &Arc<KnowledgeEntry>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of indexed mistake strings.
    pub fn mistake_count(&self) -> usize {
        self.exact.len()
    }

    pub fn exact(&self) -> &ExactIndex {
        &self.exact
    }

    /// Entry owning a normalized mistake string.
    pub fn lookup(&self, normalized: &str) -> Option<&Arc<KnowledgeEntry>> {
        self.exact.lookup(normalized).and_then(|id| self.get(id))
    }

    /// Whether `normalized` is already the correct phrase of some entry.
    pub fn is_correct_phrase(&self, normalized: &str) -> bool {
        self.entries
            .values()
            .any(|entry| entry.normalized_phrase() == normalized)
    }

    /// Token count of the longest mistake string.
    pub fn max_mistake_tokens(&self) -> usize {
        self.max_mistake_tokens
    }

    /// Fail with the first mistake already owned by an entry other than
    /// `excluding`.
    pub(crate) fn check_conflicts<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
        excluding: Option<EntryId>,
    ) -> Result<()> {
        for key in keys {
            if let Some(owner) = self.exact.lookup(key) {
                if Some(owner) != excluding {
                    return Err(CorrectorError::Conflict {
                        mistake: key.to_string(),
                        entry_id: owner,
                    });
                }
            }
        }
        Ok(())
    }

    /// A copy with `entry` inserted, replacing any entry with the same id.
    pub(crate) fn with_entry(&self, entry: KnowledgeEntry) -> Result<Self> {
        self.check_conflicts(
            entry.normalized_mistakes.iter().map(String::as_str),
            Some(entry.id),
        )?;

        let mut next = self.clone();
        if let Some(previous) = next.entries.remove(&entry.id) {
            for key in &previous.normalized_mistakes {
                next.exact.remove(key);
            }
        }
        for key in &entry.normalized_mistakes {
            next.exact.insert(key.clone(), entry.id)?;
        }
        next.entries.insert(entry.id, Arc::new(entry));
        next.refresh_max_tokens();
        Ok(next)
    }

    /// A copy without entry `id`, along with the removed entry.
    pub(crate) fn without_entry(&self, id: EntryId) -> Option<(Self, Arc<KnowledgeEntry>)> {
        let mut next = self.clone();
        let removed = next.entries.remove(&id)?;
        for key in &removed.normalized_mistakes {
            next.exact.remove(key);
        }
        next.refresh_max_tokens();
        Some((next, removed))
    }

    /// A copy with the vector flag of `id` set. `None` if the entry is gone.
    pub(crate) fn with_vector_indexed(&self, id: EntryId, indexed: bool) -> Option<Self> {
        let current = self.entries.get(&id)?;
        let mut entry = KnowledgeEntry::clone(current);
        entry.vector_indexed = indexed;

        let mut next = self.clone();
        next.entries.insert(id, Arc::new(entry));
        Some(next)
    }

    fn refresh_max_tokens(&mut self) {
        self.max_mistake_tokens = self
            .exact
            .iter()
            .map(|(key, _)| key.split(' ').count())
            .max()
            .unwrap_or(0);
    }
}

/// Shared handle publishing [`KnowledgeSnapshot`]s.
#[derive(Debug)]
pub struct KnowledgeBase {
    current: RwLock<Arc<KnowledgeSnapshot>>,
    /// Serializes writers; holds the next id to hand out.
    writer: Mutex<u64>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(KnowledgeSnapshot::default())),
            writer: Mutex::new(1),
        }
    }

    /// The latest published snapshot.
    pub async fn snapshot(&self) -> Arc<KnowledgeSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Acquire exclusive write access. Readers are not blocked except for
    /// the instant of each [`KnowledgeWriter::publish`].
    pub(crate) async fn writer(&self) -> KnowledgeWriter<'_> {
        KnowledgeWriter {
            base: self,
            next_id: self.writer.lock().await,
        }
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct KnowledgeWriter<'a> {
    base: &'a KnowledgeBase,
    next_id: MutexGuard<'a, u64>,
}

impl KnowledgeWriter<'_> {
    pub async fn current(&self) -> Arc<KnowledgeSnapshot> {
        self.base.snapshot().await
    }

    pub fn allocate_id(&mut self) -> EntryId {
        let id = EntryId(*self.next_id);
        *self.next_id += 1;
        id
    }

    pub async fn publish(&self, snapshot: KnowledgeSnapshot) {
        *self.base.current.write().await = Arc::new(snapshot);
    }
}
