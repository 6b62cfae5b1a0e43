//! Adding, replacing and removing knowledge entries.
//!
//! Every write holds the knowledge base writer for its whole duration, so
//! writes are serialized. The entry becomes visible to exact and fuzzy
//! matching as soon as it is published; vector indexing happens afterwards
//! and only flips the entry's `vector_indexed` flag when it succeeds.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{CorrectorError, Result};
use crate::knowledge::{EntryId, KnowledgeBase, KnowledgeEntry, KnowledgeWriter, NewCorrection};
use crate::seed::{SeedFailure, SeedReport, read_seed_file};
use crate::types::AddCorrectionResponse;
use crate::vector::{VectorRetriever, entry_vector_ids};

/// Result of a successful add or replace.
#[derive(Debug, Clone, PartialEq)]
pub struct AddOutcome {
    pub entry_id: EntryId,
    pub vector_indexed: bool,

    /// Why vector indexing failed, if it did.
    pub vector_error: Option<String>,
}

impl From<AddOutcome> for AddCorrectionResponse {
    fn from(outcome: AddOutcome) -> Self {
        Self {
            success: true,
            entry_id: outcome.entry_id,
            vector_indexed: outcome.vector_indexed,
            vector_error: outcome.vector_error,
        }
    }
}

/// Result of [`KnowledgeIngestor::reindex_pending`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReindexReport {
    pub indexed: Vec<EntryId>,
    pub failed: Vec<(EntryId, String)>,

    /// Leftover vectors of removed or replaced entries deleted on this pass.
    pub purged: usize,
}

/// Validates corrections and keeps every index in step with the store.
#[derive(Debug)]
pub struct KnowledgeIngestor {
    knowledge: Arc<KnowledgeBase>,
    vectors: Option<Arc<VectorRetriever>>,

    /// Vector ids whose deletion failed, retried by `reindex_pending`.
    stale: Mutex<BTreeSet<String>>,
}

impl KnowledgeIngestor {
    /// `vectors` is `None` when the vector stage is disabled; entries then
    /// stay unindexed.
    pub fn new(knowledge: Arc<KnowledgeBase>, vectors: Option<Arc<VectorRetriever>>) -> Self {
        Self {
            knowledge,
            vectors,
            stale: Mutex::new(BTreeSet::new()),
        }
    }

    /// Add a new entry.
    ///
    /// Fails with `Validation` for an empty phrase or mistake list and with
    /// `Conflict` if a mistake already belongs to another entry. In both
    /// cases nothing changes.
    pub async fn add(&self, correction: NewCorrection) -> Result<AddOutcome> {
        let valid = correction.validate()?;
        let mut writer = self.knowledge.writer().await;

        let current = writer.current().await;
        current.check_conflicts(valid.keys(), None)?;

        let id = writer.allocate_id();
        let entry = valid.into_entry(id);
        writer.publish(current.with_entry(entry.clone())?).await;
        info!(
            "added entry {id} ({:?}, {} mistakes)",
            entry.correct_phrase,
            entry.common_mistakes.len()
        );

        Ok(self.index_vectors(&writer, &entry).await)
    }

    /// Atomically replace entry `id`, keeping its id.
    ///
    /// The old mistakes stop matching in the same swap that makes the new
    /// ones visible.
    pub async fn replace(&self, id: EntryId, correction: NewCorrection) -> Result<AddOutcome> {
        let valid = correction.validate()?;
        let writer = self.knowledge.writer().await;

        let current = writer.current().await;
        let previous = current.get(id).cloned().ok_or(CorrectorError::NotFound(id))?;
        current.check_conflicts(valid.keys(), Some(id))?;

        let entry = valid.into_entry(id);
        writer.publish(current.with_entry(entry.clone())?).await;
        info!("replaced entry {id} ({:?})", entry.correct_phrase);

        if let Some(vectors) = &self.vectors {
            // Ordinals the new entry reuses are overwritten by its own upserts.
            let leftover = entry_vector_ids(&previous, entry.normalized_mistakes().len());
            self.purge(vectors, leftover).await;
        }
        Ok(self.index_vectors(&writer, &entry).await)
    }

    /// Remove entry `id` from every index.
    pub async fn remove(&self, id: EntryId) -> Result<KnowledgeEntry> {
        let writer = self.knowledge.writer().await;

        let (next, removed) = writer
            .current()
            .await
            .without_entry(id)
            .ok_or(CorrectorError::NotFound(id))?;
        writer.publish(next).await;
        info!("removed entry {id}");

        if let Some(vectors) = &self.vectors {
            self.purge(vectors, entry_vector_ids(&removed, 0)).await;
        }
        Ok(Arc::unwrap_or_clone(removed))
    }

    /// Retry vector indexing for every entry not yet indexed, and deletion of
    /// vectors left behind by earlier removals.
    pub async fn reindex_pending(&self) -> ReindexReport {
        let Some(vectors) = &self.vectors else {
            return ReindexReport::default();
        };
        let writer = self.knowledge.writer().await;

        let leftover: Vec<String> = std::mem::take(&mut *self.stale.lock().await)
            .into_iter()
            .collect();
        let attempted = leftover.len();
        self.purge(vectors, leftover).await;
        let purged = attempted - self.stale.lock().await.len();

        let pending: Vec<Arc<KnowledgeEntry>> = writer
            .current()
            .await
            .entries()
            .filter(|e| !e.vector_indexed)
            .cloned()
            .collect();

        let mut report = ReindexReport {
            purged,
            ..ReindexReport::default()
        };
        for entry in pending {
            match vectors.index_entry(&entry).await {
                Ok(()) => {
                    mark_indexed(&writer, entry.id).await;
                    report.indexed.push(entry.id);
                }
                Err(e) => {
                    warn!("entry {} still not vector-indexed: {e}", entry.id);
                    report.failed.push((entry.id, e.to_string()));
                }
            }
        }
        info!(
            "reindexed {} entries, {} still pending, purged {} stale vectors",
            report.indexed.len(),
            report.failed.len(),
            report.purged
        );
        report
    }

    /// Add every correction of a seed in order. Failures are collected, not
    /// fatal.
    pub async fn load_seed(&self, corrections: Vec<NewCorrection>) -> SeedReport {
        let mut report = SeedReport::default();
        for (index, correction) in corrections.into_iter().enumerate() {
            let correct_phrase = correction.correct_phrase.clone();
            match self.add(correction).await {
                Ok(outcome) => {
                    report.loaded += 1;
                    if self.vectors.is_some() && !outcome.vector_indexed {
                        report.vector_pending += 1;
                    }
                }
                Err(e) => {
                    warn!("skipping seed entry {index} ({correct_phrase:?}): {e}");
                    report.failed.push(SeedFailure {
                        index,
                        correct_phrase,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            "loaded {} seed entries ({} failed, {} awaiting vectors)",
            report.loaded,
            report.failed.len(),
            report.vector_pending
        );
        report
    }

    /// Read a seed file and load it.
    pub async fn load_seed_file(&self, path: &Path) -> Result<SeedReport> {
        let corrections = read_seed_file(path).await?;
        debug!("read {} seed entries from {}", corrections.len(), path.display());
        Ok(self.load_seed(corrections).await)
    }

    /// Vector ids whose deletion failed and is still outstanding.
    pub async fn stale_vectors(&self) -> usize {
        self.stale.lock().await.len()
    }

    /// Delete `ids`, remembering the ones that fail for a later retry.
    async fn purge(&self, vectors: &VectorRetriever, ids: Vec<String>) {
        let mut failed = Vec::new();
        for id in ids {
            if let Err(e) = vectors.delete_vector(&id).await {
                warn!("failed to delete vector {id}: {e}");
                failed.push(id);
            }
        }
        if !failed.is_empty() {
            self.stale.lock().await.extend(failed);
        }
    }

    async fn index_vectors(
        &self,
        writer: &KnowledgeWriter<'_>,
        entry: &KnowledgeEntry,
    ) -> AddOutcome {
        let Some(vectors) = &self.vectors else {
            return AddOutcome {
                entry_id: entry.id,
                vector_indexed: false,
                vector_error: None,
            };
        };

        let live = entry_vector_ids(entry, 0);
        self.stale.lock().await.retain(|id| !live.contains(id));

        match vectors.index_entry(entry).await {
            Ok(()) => {
                mark_indexed(writer, entry.id).await;
                AddOutcome {
                    entry_id: entry.id,
                    vector_indexed: true,
                    vector_error: None,
                }
            }
            Err(e) => {
                warn!("entry {} added without vectors: {e}", entry.id);
                AddOutcome {
                    entry_id: entry.id,
                    vector_indexed: false,
                    vector_error: Some(e.to_string()),
                }
            }
        }
    }
}

async fn mark_indexed(writer: &KnowledgeWriter<'_>, id: EntryId) {
    if let Some(next) = writer.current().await.with_vector_indexed(id, true) {
        writer.publish(next).await;
    }
}
