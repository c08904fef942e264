//! Sync runs against the in-memory upstream double, plus the sync →
//! analysis interplay around fingerprint changes.

mod common;

use std::sync::Arc;

use common::{distinct_words, upstream_doc, MockUpstream, LOREM};
use docdedupe_core::features::jobs::{null_progress_sink, CancelProbe};
use docdedupe_core::features::sync::infrastructure::{NameRef, UpstreamDocumentMeta};
use docdedupe_core::{Analyzer, DedupConfig, SyncEngine, SyncType};
use docdedupe_storage::SqliteStore;

fn engine(store: &SqliteStore, upstream: Arc<MockUpstream>) -> SyncEngine {
    SyncEngine::new(store.clone(), upstream, DedupConfig::default())
}

async fn run_sync(engine: &SyncEngine, store: &SqliteStore, force_full: bool) -> docdedupe_core::SyncOutcome {
    let progress = null_progress_sink();
    let cancel = CancelProbe::never(store.clone());
    engine.run(force_full, &progress, &cancel).await.unwrap()
}

fn five_document_upstream(page_size: usize) -> Arc<MockUpstream> {
    let upstream = MockUpstream::new(page_size);
    for i in 1..=5i64 {
        upstream.push_document(upstream_doc(
            i,
            &format!("Document {i}"),
            &format!("{} {LOREM}", distinct_words("doc", i as usize)),
            &format!("2020-01-0{i}T10:00:00Z"),
        ));
        upstream
            .metadata
            .lock()
            .unwrap()
            .insert(i, UpstreamDocumentMeta {
                original_size: Some(1000 * i),
                archive_size: Some(800 * i),
            });
    }
    Arc::new(upstream)
}

#[tokio::test]
async fn full_sync_inserts_everything() {
    let store = SqliteStore::open_in_memory().unwrap();
    // Page size 2 exercises next-URL pagination.
    let upstream = five_document_upstream(2);
    let engine = engine(&store, Arc::clone(&upstream));

    let outcome = run_sync(&engine, &store, false).await;
    assert_eq!(outcome.sync_type, SyncType::Full);
    assert_eq!(outcome.fetched, 5);
    assert_eq!(outcome.inserted, 5);
    assert_eq!(outcome.updated, 0);
    assert_eq!(outcome.skipped, 0);
    assert_eq!(outcome.failed, 0);

    // Contents were normalised and file sizes back-filled.
    let doc = store.document_by_upstream_id(3).unwrap().unwrap();
    assert_eq!(doc.archive_size, Some(2400));
    let content = store.content(doc.id).unwrap().unwrap();
    assert!(content.word_count > 60);

    let state = store.sync_state().unwrap();
    assert_eq!(state.total_documents, 5);
    assert_eq!(state.last_sync_document_count, 5);
    assert!(state.last_sync_at.is_some());
}

#[tokio::test]
async fn unchanged_upstream_skips_all() {
    let store = SqliteStore::open_in_memory().unwrap();
    // One page: the early-stop check fires only after the whole listing
    // has been walked.
    let upstream = five_document_upstream(10);
    let engine = engine(&store, Arc::clone(&upstream));

    run_sync(&engine, &store, false).await;
    let fingerprints_before: Vec<String> = store
        .documents()
        .unwrap()
        .into_iter()
        .map(|d| d.fingerprint)
        .collect();
    let first_sync_at = store.sync_state().unwrap().last_sync_at.unwrap();

    let outcome = run_sync(&engine, &store, false).await;
    assert_eq!(outcome.sync_type, SyncType::Incremental);
    assert_eq!(outcome.inserted, 0);
    assert_eq!(outcome.updated, 0);
    assert_eq!(outcome.skipped, 5);

    let fingerprints_after: Vec<String> = store
        .documents()
        .unwrap()
        .into_iter()
        .map(|d| d.fingerprint)
        .collect();
    assert_eq!(fingerprints_before, fingerprints_after);
    assert!(store.sync_state().unwrap().last_sync_at.unwrap() >= first_sync_at);
}

#[tokio::test]
async fn incremental_stops_early_below_last_sync() {
    let store = SqliteStore::open_in_memory().unwrap();
    let upstream = five_document_upstream(2);
    let engine = engine(&store, Arc::clone(&upstream));

    run_sync(&engine, &store, false).await;

    // One document is touched well after everything else.
    upstream.set_modified(5, "2030-01-01T00:00:00Z");
    upstream.set_content(5, &format!("{LOREM} amended"));

    let outcome = run_sync(&engine, &store, false).await;
    assert_eq!(outcome.sync_type, SyncType::Incremental);
    assert_eq!(outcome.updated, 1);
    // Page size 2: the first page already dips below last_sync_at, so
    // the walk never touches the remaining pages.
    assert_eq!(outcome.fetched, 2);
}

#[tokio::test]
async fn force_full_rescans_everything() {
    let store = SqliteStore::open_in_memory().unwrap();
    let upstream = five_document_upstream(2);
    let engine = engine(&store, Arc::clone(&upstream));

    run_sync(&engine, &store, false).await;
    let outcome = run_sync(&engine, &store, true).await;
    assert_eq!(outcome.sync_type, SyncType::Full);
    assert_eq!(outcome.fetched, 5);
    assert_eq!(outcome.skipped, 5);
}

#[tokio::test]
async fn fingerprint_change_triggers_signature_regeneration() {
    let store = SqliteStore::open_in_memory().unwrap();
    let upstream = five_document_upstream(10);
    let engine = engine(&store, Arc::clone(&upstream));
    let config = DedupConfig::default();

    run_sync(&engine, &store, false).await;

    let analyzer = Analyzer::new(store.clone(), config.clone());
    let progress = null_progress_sink();
    let cancel = CancelProbe::never(store.clone());
    let first = analyzer.run(false, &progress, &cancel).await.unwrap();
    assert_eq!(first.generated, 5);

    // Upstream edit: new modified stamp and amended content.
    upstream.set_modified(2, "2030-02-01T00:00:00Z");
    upstream.set_content(2, &format!("{} {LOREM} amended", distinct_words("doc", 2)));
    let resync = run_sync(&engine, &store, false).await;
    assert_eq!(resync.updated, 1);

    let second = analyzer.run(false, &progress, &cancel).await.unwrap();
    assert_eq!(second.generated, 1);
    assert_eq!(second.reused, 4);
}

#[tokio::test]
async fn resolved_names_land_on_documents() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut upstream = MockUpstream::new(10);
    upstream.tags = vec![
        NameRef { id: 1, name: "tax".into() },
        NameRef { id: 2, name: "inbox".into() },
    ];
    upstream.correspondents = vec![NameRef { id: 9, name: "ACME GmbH".into() }];
    upstream.document_types = vec![NameRef { id: 4, name: "invoice".into() }];

    let mut doc = upstream_doc(1, "Invoice", LOREM, "2026-03-01T10:00:00Z");
    doc.tags = vec![2, 1];
    doc.correspondent = Some(9);
    doc.document_type = Some(4);
    upstream.push_document(doc);

    let upstream = Arc::new(upstream);
    let engine = engine(&store, Arc::clone(&upstream));
    run_sync(&engine, &store, false).await;

    let stored = store.document_by_upstream_id(1).unwrap().unwrap();
    assert_eq!(stored.correspondent.as_deref(), Some("ACME GmbH"));
    assert_eq!(stored.document_type.as_deref(), Some("invoice"));
    // Tag names arrive sorted.
    assert_eq!(stored.tags, vec!["inbox", "tax"]);
}
