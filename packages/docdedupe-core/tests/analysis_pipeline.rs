//! End-to-end analysis runs over an in-memory store.

mod common;

use common::{distinct_words, seed_document, set_content, LOREM};
use docdedupe_core::features::jobs::{null_progress_sink, CancelProbe};
use docdedupe_core::{Analyzer, DedupConfig};
use docdedupe_storage::{GroupStatus, SqliteStore};

async fn run_analysis(
    store: &SqliteStore,
    config: &DedupConfig,
    force: bool,
) -> docdedupe_core::AnalysisOutcome {
    let analyzer = Analyzer::new(store.clone(), config.clone());
    let progress = null_progress_sink();
    let cancel = CancelProbe::never(store.clone());
    analyzer.run(force, &progress, &cancel).await.unwrap()
}

#[tokio::test]
async fn identical_documents_form_one_group() {
    let store = SqliteStore::open_in_memory().unwrap();
    seed_document(&store, 1, "Scan 001", LOREM, Some(500));
    seed_document(&store, 2, "Scan 001 (copy)", LOREM, Some(900));
    seed_document(&store, 3, "Scan 001 (copy 2)", LOREM, Some(100));

    let config = DedupConfig::default();
    let outcome = run_analysis(&store, &config, false).await;

    assert_eq!(outcome.documents, 3);
    assert_eq!(outcome.generated, 3);
    assert_eq!(outcome.reused, 0);
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.removed, 0);

    let groups = store.groups_with_members().unwrap();
    assert_eq!(groups.len(), 1);
    let (group, members) = &groups[0];
    assert_eq!(members.len(), 3);
    assert_eq!(group.scores.jaccard, 1.0);
    assert_eq!(group.scores.fuzzy, 1.0);
    assert!(group.scores.confidence >= 0.95);
    assert_eq!(group.status, GroupStatus::Pending);

    // Exactly one primary: the largest archive (upstream 2).
    let primaries: Vec<_> = members.iter().filter(|m| m.is_primary).collect();
    assert_eq!(primaries.len(), 1);
    let primary_doc = store.document(primaries[0].document_id).unwrap().unwrap();
    assert_eq!(primary_doc.upstream_id, 2);
}

#[tokio::test]
async fn threshold_cuts_off_partial_overlap() {
    // B shares a 78-word prefix of A's 100 words: the true trigram
    // Jaccard is 76 / 120 = 0.63, between the two thresholds under test.
    let a_text = distinct_words("alpha", 100);
    let b_text = format!(
        "{} {}",
        distinct_words("alpha", 78),
        distinct_words("beta", 22)
    );

    // Extra permutations tighten the estimate around 0.63.
    let config = DedupConfig {
        num_permutations: 512,
        num_bands: 100,
        ..DedupConfig::default()
    };

    // At 0.75 the pair is pruned.
    {
        let store = SqliteStore::open_in_memory().unwrap();
        seed_document(&store, 1, "a", &a_text, None);
        seed_document(&store, 2, "b", &b_text, None);
        let strict = DedupConfig {
            similarity_threshold: 0.75,
            ..config.clone()
        };
        let outcome = run_analysis(&store, &strict, false).await;
        assert_eq!(outcome.created, 0);
        assert!(store.groups().unwrap().is_empty());
    }

    // At 0.50 it clusters.
    {
        let store = SqliteStore::open_in_memory().unwrap();
        seed_document(&store, 1, "a", &a_text, None);
        seed_document(&store, 2, "b", &b_text, None);
        let relaxed = DedupConfig {
            similarity_threshold: 0.50,
            ..config.clone()
        };
        let outcome = run_analysis(&store, &relaxed, false).await;
        assert_eq!(outcome.created, 1);

        let groups = store.groups_with_members().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.len(), 2);
    }
}

#[tokio::test]
async fn analysis_is_idempotent() {
    let store = SqliteStore::open_in_memory().unwrap();
    seed_document(&store, 1, "a", LOREM, Some(10));
    seed_document(&store, 2, "b", LOREM, Some(20));
    seed_document(&store, 3, "c", &distinct_words("other", 80), None);

    let config = DedupConfig::default();
    let first = run_analysis(&store, &config, false).await;
    assert_eq!(first.created, 1);
    assert_eq!(first.generated, 3);

    let second = run_analysis(&store, &config, false).await;
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(second.removed, 0);
    assert_eq!(second.generated, 0);
    assert_eq!(second.reused, 3);
}

#[tokio::test]
async fn content_change_regenerates_only_that_signature() {
    let store = SqliteStore::open_in_memory().unwrap();
    let a = seed_document(&store, 1, "a", LOREM, None);
    seed_document(&store, 2, "b", LOREM, None);
    seed_document(&store, 3, "c", &distinct_words("other", 80), None);

    let config = DedupConfig::default();
    run_analysis(&store, &config, false).await;

    // One document's text changes; its content hash moves with it.
    set_content(&store, a, &format!("{LOREM} postscriptum"));
    let outcome = run_analysis(&store, &config, false).await;
    assert_eq!(outcome.generated, 1);
    assert_eq!(outcome.reused, 2);
}

#[tokio::test]
async fn parameter_change_invalidates_all_signatures() {
    let store = SqliteStore::open_in_memory().unwrap();
    seed_document(&store, 1, "a", LOREM, None);
    seed_document(&store, 2, "b", LOREM, None);

    let config = DedupConfig::default();
    run_analysis(&store, &config, false).await;

    // A different n-gram size changes the algorithm version.
    let reshingled = DedupConfig {
        ngram_size: 4,
        ..config
    };
    let outcome = run_analysis(&store, &reshingled, false).await;
    assert_eq!(outcome.generated, 2);
    assert_eq!(outcome.reused, 0);
}

#[tokio::test]
async fn force_discards_signatures_and_resets_group_state() {
    let store = SqliteStore::open_in_memory().unwrap();
    seed_document(&store, 1, "a", LOREM, Some(10));
    seed_document(&store, 2, "b", LOREM, Some(20));

    let config = DedupConfig::default();
    run_analysis(&store, &config, false).await;

    let group = store.groups().unwrap().remove(0);
    store
        .set_group_status(group.id, GroupStatus::Ignored)
        .unwrap();

    // A normal run preserves operator state on kept groups.
    run_analysis(&store, &config, false).await;
    assert_eq!(
        store.group(group.id).unwrap().unwrap().status,
        GroupStatus::Ignored
    );

    // A forced run regenerates everything and resets the status.
    let outcome = run_analysis(&store, &config, true).await;
    assert_eq!(outcome.generated, 2);
    assert_eq!(outcome.reused, 0);
    assert_eq!(outcome.updated, 1);
    assert_eq!(
        store.group(group.id).unwrap().unwrap().status,
        GroupStatus::Pending
    );
}

#[tokio::test]
async fn short_documents_stay_out_of_the_corpus() {
    let store = SqliteStore::open_in_memory().unwrap();
    seed_document(&store, 1, "short", "too few words here", None);
    seed_document(&store, 2, "short twin", "too few words here", None);

    let outcome = run_analysis(&store, &DedupConfig::default(), false).await;
    assert_eq!(outcome.documents, 0);
    assert_eq!(outcome.created, 0);
    assert!(store.groups().unwrap().is_empty());
}

#[tokio::test]
async fn vanished_duplicates_remove_the_group() {
    let store = SqliteStore::open_in_memory().unwrap();
    let a = seed_document(&store, 1, "a", LOREM, None);
    seed_document(&store, 2, "b", LOREM, None);

    let config = DedupConfig::default();
    let first = run_analysis(&store, &config, false).await;
    assert_eq!(first.created, 1);

    // The pair diverges; the group must disappear.
    set_content(&store, a, &distinct_words("diverged", 90));
    let second = run_analysis(&store, &config, false).await;
    assert_eq!(second.removed, 1);
    assert!(store.groups().unwrap().is_empty());
}
