mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use stt_corrector::{
    CorrectionMethod, CorrectorConfig, CorrectorError, EntryId, NewCorrection, SttCorrector,
};

use common::{FlakyIndex, StalledProvider, corrector_with, meeting, short_timeouts};

#[tokio::test]
async fn test_add_then_correct_has_no_gap() {
    let corrector = corrector_with(vec![]).await;
    let outcome = corrector.add_correction(meeting()).await.unwrap();

    assert_eq!(outcome.entry_id, EntryId(1));
    assert!(outcome.vector_indexed);
    for mistake in ["start eating", "start meting"] {
        assert_eq!(
            corrector.correct(mistake).await.method,
            CorrectionMethod::DirectMatch
        );
    }

    let stats = corrector.stats().await;
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.mistakes, 2);
    assert_eq!(stats.vector_indexed_entries, 1);
    assert_eq!(stats.vector_pending_entries, 0);
    assert_eq!(stats.vectors_stored, 2);
}

#[tokio::test]
async fn test_validation_errors() {
    let corrector = corrector_with(vec![]).await;

    for correction in [
        NewCorrection::new("", ["x"]),
        NewCorrection::new("start meeting", Vec::<String>::new()),
        NewCorrection::new("start meeting", ["   "]),
    ] {
        let err = corrector.add_correction(correction).await.unwrap_err();
        assert!(matches!(err, CorrectorError::Validation(_)), "{err}");
    }
    assert_eq!(corrector.stats().await.entries, 0);
}

#[tokio::test]
async fn test_conflict_is_rejected_and_changes_nothing() {
    let corrector = corrector_with(vec![meeting()]).await;
    let before = corrector.snapshot().await;

    let err = corrector
        .add_correction(NewCorrection::new("stop eating", ["stop eatin", "Start Eating."]))
        .await
        .unwrap_err();
    match err {
        CorrectorError::Conflict { mistake, entry_id } => {
            assert_eq!(mistake, "start eating");
            assert_eq!(entry_id, EntryId(1));
        }
        other => panic!("unexpected error: {other}"),
    }

    let after = corrector.snapshot().await;
    assert_eq!(after.len(), before.len());
    assert_eq!(after.mistake_count(), before.mistake_count());
    assert!(after.lookup("stop eatin").is_none());
    assert_eq!(
        corrector.correct("start eating").await.corrected_text,
        "start meeting"
    );
}

#[tokio::test]
async fn test_ids_are_not_reused() {
    let corrector = corrector_with(vec![meeting()]).await;
    corrector.remove_correction(EntryId(1)).await.unwrap();

    let outcome = corrector.add_correction(meeting()).await.unwrap();
    assert_eq!(outcome.entry_id, EntryId(2));
}

#[tokio::test]
async fn test_replace_moves_mistakes() {
    let corrector = corrector_with(vec![meeting()]).await;
    let outcome = corrector
        .replace_correction(
            EntryId(1),
            NewCorrection::new("start meeting", ["stat meeting"]),
        )
        .await
        .unwrap();
    assert_eq!(outcome.entry_id, EntryId(1));

    let old = corrector.correct("start eating").await;
    assert_ne!(old.method, CorrectionMethod::DirectMatch);
    let new = corrector.correct("stat meeting").await;
    assert_eq!(new.method, CorrectionMethod::DirectMatch);
    assert_eq!(new.corrected_text, "start meeting");

    let stats = corrector.stats().await;
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.mistakes, 1);
    assert_eq!(stats.vectors_stored, 1);
}

#[tokio::test]
async fn test_replace_may_keep_own_mistakes() {
    let corrector = corrector_with(vec![meeting()]).await;
    corrector
        .replace_correction(
            EntryId(1),
            NewCorrection::new("start the meeting", ["start eating"]),
        )
        .await
        .unwrap();

    assert_eq!(
        corrector.correct("start eating").await.corrected_text,
        "start the meeting"
    );
}

#[tokio::test]
async fn test_replace_and_remove_unknown_entry() {
    let corrector = corrector_with(vec![]).await;

    let err = corrector
        .replace_correction(EntryId(7), meeting())
        .await
        .unwrap_err();
    assert!(matches!(err, CorrectorError::NotFound(EntryId(7))));

    let err = corrector.remove_correction(EntryId(7)).await.unwrap_err();
    assert!(matches!(err, CorrectorError::NotFound(EntryId(7))));
}

#[tokio::test]
async fn test_remove_unmatches_every_stage() {
    let corrector = corrector_with(vec![meeting()]).await;
    let removed = corrector.remove_correction(EntryId(1)).await.unwrap();
    assert_eq!(removed.correct_phrase, "start meeting");

    for text in ["start eating", "strt eatng", "start eatin"] {
        let result = corrector.correct(text).await;
        assert_eq!(result.method, CorrectionMethod::None, "{text}");
    }
    assert_eq!(corrector.stats().await.vectors_stored, 0);
}

#[tokio::test]
async fn test_failing_index_leaves_entry_pending() {
    let index = FlakyIndex::failing();
    let corrector = SttCorrector::builder()
        .with_vector_index(Arc::clone(&index) as _)
        .build()
        .await
        .unwrap();

    let outcome = corrector.add_correction(meeting()).await.unwrap();
    assert!(!outcome.vector_indexed);
    assert!(outcome.vector_error.unwrap().contains("index offline"));

    assert_eq!(
        corrector.correct("start eating").await.method,
        CorrectionMethod::DirectMatch
    );
    let stats = corrector.stats().await;
    assert_eq!(stats.vector_pending_entries, 1);
    assert!(!corrector.entry(EntryId(1)).await.unwrap().vector_indexed);

    index.recover();
    let report = corrector.reindex_pending().await;
    assert_eq!(report.indexed, vec![EntryId(1)]);
    assert!(report.failed.is_empty());

    let stats = corrector.stats().await;
    assert_eq!(stats.vector_indexed_entries, 1);
    assert_eq!(stats.vector_pending_entries, 0);
    assert_eq!(stats.vectors_stored, 2);
}

#[tokio::test]
async fn test_failed_vector_deletes_are_retried() {
    let index = FlakyIndex::failing();
    index.recover();
    let corrector = SttCorrector::builder()
        .with_vector_index(Arc::clone(&index) as _)
        .build()
        .await
        .unwrap();
    corrector.add_correction(meeting()).await.unwrap();

    index.go_offline();
    corrector.remove_correction(EntryId(1)).await.unwrap();
    let stats = corrector.stats().await;
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.vectors_stored, 2);
    assert_eq!(stats.vectors_stale, 2);
    assert_eq!(
        corrector.correct("start eatin").await.method,
        CorrectionMethod::None
    );

    let report = corrector.reindex_pending().await;
    assert_eq!(report.purged, 0);
    assert_eq!(corrector.stats().await.vectors_stale, 2);

    index.recover();
    let report = corrector.reindex_pending().await;
    assert_eq!(report.purged, 2);
    let stats = corrector.stats().await;
    assert_eq!(stats.vectors_stored, 0);
    assert_eq!(stats.vectors_stale, 0);
}

#[tokio::test]
async fn test_replace_keeps_reused_vector_slots_live() {
    let index = FlakyIndex::failing();
    index.recover();
    let corrector = SttCorrector::builder()
        .with_vector_index(Arc::clone(&index) as _)
        .build()
        .await
        .unwrap();
    corrector.add_correction(meeting()).await.unwrap();

    index.go_offline();
    let outcome = corrector
        .replace_correction(
            EntryId(1),
            NewCorrection::new("start meeting", ["stat meeting"]),
        )
        .await
        .unwrap();
    assert!(!outcome.vector_indexed);
    assert_eq!(corrector.stats().await.vectors_stale, 1);

    index.recover();
    let report = corrector.reindex_pending().await;
    assert_eq!(report.purged, 1);
    assert_eq!(report.indexed, vec![EntryId(1)]);

    let stats = corrector.stats().await;
    assert_eq!(stats.vectors_stored, 1);
    assert_eq!(stats.vectors_stale, 0);
    assert_eq!(stats.vector_pending_entries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_embedding_timeout_is_reported_on_add() {
    let corrector = SttCorrector::builder()
        .with_config(short_timeouts(CorrectorConfig::default()))
        .with_embedding_provider(Arc::new(StalledProvider))
        .build()
        .await
        .unwrap();

    let outcome = corrector.add_correction(meeting()).await.unwrap();
    assert!(!outcome.vector_indexed);
    assert!(outcome.vector_error.unwrap().contains("timed out"));
    assert_eq!(
        corrector.correct("start meting").await.corrected_text,
        "start meeting"
    );

    let report = corrector.reindex_pending().await;
    assert_eq!(report.failed.len(), 1);
    assert!(report.indexed.is_empty());
}

#[tokio::test]
async fn test_seed_file_loads_and_collects_failures() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knowledge_base.json");
    std::fs::write(
        &path,
        r#"{"corrections": [
            {"correct_phrase": "start meeting", "common_mistakes": ["start eating", "start meting"], "context": "calendar", "category": "meetings"},
            {"correct_phrase": "", "common_mistakes": ["nothing"]},
            {"correct_phrase": "stop eating", "common_mistakes": ["start eating"]},
            {"correct_phrase": "end call", "common_mistakes": ["and call"]}
        ]}"#,
    )
    .unwrap();

    let corrector = corrector_with(vec![]).await;
    let report = corrector.load_seed_file(&path).await.unwrap();

    assert_eq!(report.loaded, 2);
    assert_eq!(report.vector_pending, 0);
    let failed: Vec<usize> = report.failed.iter().map(|f| f.index).collect();
    assert_eq!(failed, vec![1, 2]);
    assert_eq!(report.failed[1].correct_phrase, "stop eating");
    assert_eq!(
        corrector.correct("and call").await.corrected_text,
        "end call"
    );
}

#[tokio::test]
async fn test_builder_loads_configured_seed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kb.json");
    std::fs::write(
        &path,
        r#"[{"correct_phrase": "start meeting", "common_mistakes": ["start eating"]}]"#,
    )
    .unwrap();

    let corrector = SttCorrector::builder()
        .with_knowledge_base(&path)
        .build()
        .await
        .unwrap();
    assert_eq!(corrector.stats().await.entries, 1);
}

#[tokio::test]
async fn test_missing_seed_fails_build() {
    let dir = tempfile::tempdir().unwrap();
    let result = SttCorrector::builder()
        .with_knowledge_base(dir.path().join("missing.json"))
        .build()
        .await;
    assert!(matches!(result, Err(CorrectorError::Seed(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_and_reads_stay_consistent() {
    let corrector = Arc::new(corrector_with(vec![]).await);

    let writers: Vec<_> = (0..16)
        .map(|i| {
            let corrector = Arc::clone(&corrector);
            tokio::spawn(async move {
                corrector
                    .add_correction(NewCorrection::new(
                        format!("phrase {i}"),
                        [format!("mistake number {i}")],
                    ))
                    .await
                    .unwrap()
                    .entry_id
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let corrector = Arc::clone(&corrector);
            tokio::spawn(async move {
                for _ in 0..50 {
                    let snapshot = corrector.snapshot().await;
                    for (key, id) in snapshot.exact().iter() {
                        let entry = snapshot.get(id).unwrap();
                        assert!(entry.normalized_mistakes().iter().any(|m| m == key));
                    }
                    for entry in snapshot.entries() {
                        for key in entry.normalized_mistakes() {
                            assert_eq!(snapshot.exact().lookup(key), Some(entry.id));
                        }
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let mut ids = Vec::new();
    for writer in writers {
        ids.push(writer.await.unwrap());
    }
    for reader in readers {
        reader.await.unwrap();
    }

    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    for i in 0..16 {
        let result = corrector.correct(&format!("mistake number {i}")).await;
        assert_eq!(result.corrected_text, format!("phrase {i}"));
    }
}
