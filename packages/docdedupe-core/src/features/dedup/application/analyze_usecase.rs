//! End-to-end duplicate analysis
//!
//! One run walks the whole corpus: signature reuse/regeneration, LSH
//! candidate discovery, quick-pruned scoring, union-find clustering and
//! a reconcile against the existing groups. Nothing is persisted along
//! the way; the regenerated signatures and the reconcile plan land
//! together in the store's single `commit_analysis` transaction, so a
//! crash mid-run can never leave fresh signatures beside a stale group
//! table.
//!
//! Progress bands: select 0–5%, signatures 5–45%, index 45–55%,
//! candidates 55–65%, scoring 65–85%, clustering 85–95%,
//! reconcile 95–100%.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use docdedupe_storage::{
    CorpusDocument, DocumentSignature, GroupDraft, GroupScores, GroupUpdate, MemberDraft,
    ReconcilePlan, SqliteStore,
};

use crate::features::config::DedupConfig;
use crate::features::dedup::domain::scoring::{
    score_pair, weighted_overall, ScoringOptions, ScoringRecord, SimilarityResult,
};
use crate::features::dedup::domain::shingler::shingles;
use crate::features::dedup::domain::union_find::UnionFind;
use crate::features::dedup::infrastructure::lsh::{
    algorithm_version, LshIndex, MinHashSignature,
};
use crate::features::jobs::{CancelProbe, ProgressSink};
use crate::shared::error::Result;

/// Scored pairs between cancellation checks in the scoring loop.
const SCORING_CANCEL_STRIDE: usize = 250;

/// Result payload of one analysis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisOutcome {
    pub documents: u32,
    pub generated: u32,
    pub reused: u32,
    pub candidate_pairs: u32,
    pub scored_pairs: u32,
    pub created: u32,
    pub updated: u32,
    pub removed: u32,
}

/// Duplicate analysis engine. One instance per run; owns nothing shared.
pub struct Analyzer {
    store: SqliteStore,
    config: DedupConfig,
}

impl Analyzer {
    pub fn new(store: SqliteStore, config: DedupConfig) -> Self {
        Self { store, config }
    }

    /// Run one full analysis. `force` discards stored signatures and
    /// rewrites kept groups' membership, primary and status.
    pub async fn run(
        &self,
        force: bool,
        progress: &ProgressSink,
        cancel: &CancelProbe,
    ) -> Result<AnalysisOutcome> {
        let mut outcome = AnalysisOutcome::default();
        let version = algorithm_version(self.config.ngram_size);

        // Stage 1: corpus selection.
        progress(0.0, "selecting analysis corpus");
        let corpus = self
            .store
            .analysis_corpus(self.config.min_words as i64)?;
        outcome.documents = corpus.len() as u32;
        progress(0.05, &format!("{} documents selected", corpus.len()));
        cancel.check()?;

        // Stage 2: signatures.
        let (signatures, new_signatures) =
            self.ensure_signatures(&corpus, &version, force, &mut outcome, progress, cancel)?;
        cancel.check()?;

        // Stage 3: LSH index.
        progress(0.45, "building LSH index");
        let mut index = LshIndex::for_config(
            self.config.num_permutations as usize,
            self.config.num_bands as usize,
        );
        for (&doc_id, signature) in &signatures {
            index.insert(doc_id, signature);
        }
        progress(0.55, "LSH index built");
        cancel.check()?;

        // Stage 4: candidate pairs.
        let pairs = self.candidate_pairs(&index, &signatures);
        outcome.candidate_pairs = pairs.len() as u32;
        progress(0.65, &format!("{} candidate pairs", pairs.len()));
        cancel.check()?;

        // Stage 5: scoring.
        let scored = self
            .score_candidates(&corpus, &signatures, &pairs, &mut outcome, progress, cancel)
            .await?;
        progress(0.85, &format!("{} pairs above threshold", scored.len()));

        // Stage 6: clustering.
        let drafts = self.cluster(&corpus, &scored, &version);
        progress(0.95, &format!("{} duplicate groups", drafts.len()));
        cancel.check()?;

        // Stage 7: reconcile. New signatures and the group changes
        // commit as one unit.
        let plan = self.reconcile(drafts, force)?;
        let counts = self.store.commit_analysis(&new_signatures, &plan)?;
        outcome.created = counts.created;
        outcome.updated = counts.updated;
        outcome.removed = counts.removed;
        progress(1.0, "analysis complete");

        info!(
            documents = outcome.documents,
            generated = outcome.generated,
            reused = outcome.reused,
            created = outcome.created,
            updated = outcome.updated,
            removed = outcome.removed,
            "analysis finished"
        );
        Ok(outcome)
    }

    /// Reuse stored signatures where the algorithm version, permutation
    /// count and content hash still match; compute the rest in parallel.
    /// Returns the working set plus the encoded rows for the newly
    /// computed signatures, which the final commit persists alongside
    /// the reconcile plan.
    fn ensure_signatures(
        &self,
        corpus: &[CorpusDocument],
        version: &str,
        force: bool,
        outcome: &mut AnalysisOutcome,
        progress: &ProgressSink,
        cancel: &CancelProbe,
    ) -> Result<(HashMap<i64, MinHashSignature>, Vec<DocumentSignature>)> {
        let permutations = self.config.num_permutations as usize;
        let ngram_size = self.config.ngram_size as usize;
        let min_words = self.config.min_words as usize;

        let stored: HashMap<i64, DocumentSignature> = if force {
            HashMap::new()
        } else {
            self.store
                .signatures()?
                .into_iter()
                .map(|sig| (sig.document_id, sig))
                .collect()
        };

        let mut signatures = HashMap::with_capacity(corpus.len());
        let mut missing: Vec<&CorpusDocument> = Vec::new();

        for doc in corpus {
            match stored.get(&doc.document_id) {
                Some(sig)
                    if sig.algorithm_version == version
                        && sig.permutations as usize == permutations
                        && sig.content_hash == doc.content_hash =>
                {
                    let parsed = MinHashSignature::from_bytes(&sig.signature, permutations)?;
                    signatures.insert(doc.document_id, parsed);
                    outcome.reused += 1;
                }
                _ => missing.push(doc),
            }
        }
        debug!(reused = outcome.reused, missing = missing.len(), "signature reuse decided");
        cancel.check()?;

        let computed: Vec<(i64, String, Option<MinHashSignature>)> = missing
            .par_iter()
            .map(|doc| {
                let signature = shingles(&doc.normalized_text, ngram_size, min_words)
                    .map(|set| MinHashSignature::from_shingles(&set, permutations));
                (doc.document_id, doc.content_hash.clone(), signature)
            })
            .collect();

        let total = computed.len().max(1);
        let mut new_signatures = Vec::with_capacity(computed.len());
        for (i, (document_id, content_hash, signature)) in computed.into_iter().enumerate() {
            // The word-count gate already ran in SQL; a None here means
            // the stored count and the tokenizer disagree, so the safe
            // move is to leave the document out of this run.
            let Some(signature) = signature else {
                debug!(document_id, "document fell below the shingle gate, skipped");
                continue;
            };
            new_signatures.push(DocumentSignature {
                document_id,
                signature: signature.to_bytes(),
                algorithm_version: version.to_string(),
                permutations: permutations as i64,
                content_hash,
            });
            signatures.insert(document_id, signature);
            outcome.generated += 1;

            if i % 64 == 0 {
                cancel.check()?;
                let fraction = 0.05 + 0.40 * (i as f32 / total as f32);
                progress(fraction, &format!("signatures {i}/{total}"));
            }
        }
        progress(0.45, &format!("signatures ready ({} new)", outcome.generated));
        Ok((signatures, new_signatures))
    }

    /// Deduplicated unordered candidate pairs from the LSH index.
    fn candidate_pairs(
        &self,
        index: &LshIndex,
        signatures: &HashMap<i64, MinHashSignature>,
    ) -> Vec<(i64, i64)> {
        let mut doc_ids: Vec<i64> = signatures.keys().copied().collect();
        doc_ids.sort_unstable();

        let mut pairs = HashSet::new();
        for &doc_id in &doc_ids {
            for candidate in index.candidates(&signatures[&doc_id]) {
                if candidate != doc_id {
                    pairs.insert((doc_id.min(candidate), doc_id.max(candidate)));
                }
            }
        }
        let mut out: Vec<(i64, i64)> = pairs.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Quick-prune by estimated Jaccard, then full scoring; keeps pairs
    /// whose overall meets the threshold.
    async fn score_candidates(
        &self,
        corpus: &[CorpusDocument],
        signatures: &HashMap<i64, MinHashSignature>,
        pairs: &[(i64, i64)],
        outcome: &mut AnalysisOutcome,
        progress: &ProgressSink,
        cancel: &CancelProbe,
    ) -> Result<Vec<ScoredPair>> {
        let records: HashMap<i64, ScoringRecord> = corpus
            .iter()
            .map(|doc| (doc.document_id, scoring_record(doc)))
            .collect();
        let weights = self.config.weights();
        let options = ScoringOptions {
            quick: false,
            fuzzy_sample_size: self.config.fuzzy_sample_size as usize,
        };
        let threshold = self.config.similarity_threshold;

        let mut kept = Vec::new();
        let total = pairs.len().max(1);
        for (i, &(a, b)) in pairs.iter().enumerate() {
            if i % SCORING_CANCEL_STRIDE == 0 {
                cancel.check()?;
                progress(
                    0.65 + 0.20 * (i as f32 / total as f32),
                    &format!("scoring pairs {i}/{}", pairs.len()),
                );
                tokio::task::yield_now().await;
            }

            let jaccard = signatures[&a].jaccard_estimate(&signatures[&b]);
            if jaccard < threshold {
                continue;
            }

            let result = score_pair(&records[&a], &records[&b], jaccard, &weights, &options);
            outcome.scored_pairs += 1;
            if result.overall >= threshold {
                kept.push(ScoredPair { a, b, result });
            }
        }
        Ok(kept)
    }

    /// Union-find over the surviving pairs; components of two or more
    /// become group drafts with median component scores and a
    /// deterministic primary.
    fn cluster(
        &self,
        corpus: &[CorpusDocument],
        scored: &[ScoredPair],
        version: &str,
    ) -> Vec<GroupDraft> {
        let by_id: HashMap<i64, &CorpusDocument> =
            corpus.iter().map(|doc| (doc.document_id, doc)).collect();

        let mut uf = UnionFind::new();
        for pair in scored {
            uf.union(pair.a, pair.b);
        }

        let weights = self.config.weights();
        let mut drafts = Vec::new();
        for (_, mut members) in uf.groups() {
            if members.len() < 2 {
                continue;
            }
            members.sort_unstable();
            let member_set: HashSet<i64> = members.iter().copied().collect();

            let group_pairs: Vec<&ScoredPair> = scored
                .iter()
                .filter(|pair| member_set.contains(&pair.a) && member_set.contains(&pair.b))
                .collect();

            let jaccard = median(group_pairs.iter().map(|p| p.result.jaccard)).unwrap_or(0.0);
            let fuzzy = median(group_pairs.iter().map(|p| p.result.fuzzy)).unwrap_or(0.0);
            let metadata = median(group_pairs.iter().filter_map(|p| p.result.metadata));
            let filename = median(group_pairs.iter().filter_map(|p| p.result.filename));
            let confidence = weighted_overall(&weights, jaccard, fuzzy, metadata, filename);

            let primary = choose_primary(&members, &by_id);
            drafts.push(GroupDraft {
                scores: GroupScores {
                    confidence,
                    jaccard,
                    fuzzy,
                    metadata,
                    filename,
                },
                algorithm_version: version.to_string(),
                members: members
                    .iter()
                    .map(|&document_id| MemberDraft {
                        document_id,
                        is_primary: document_id == primary,
                    })
                    .collect(),
            });
        }
        // Deterministic order for stable ids and stable tests.
        drafts.sort_by_key(|draft| draft.members.first().map(|m| m.document_id));
        drafts
    }

    /// Match new drafts to existing groups by exact member-set equality.
    /// Matches become updates (status and primary kept unless `force`),
    /// unmatched drafts are inserts, unmatched existing groups are
    /// deletes.
    fn reconcile(&self, drafts: Vec<GroupDraft>, force: bool) -> Result<ReconcilePlan> {
        let existing = self.store.groups_with_members()?;
        let mut existing_by_members: HashMap<Vec<i64>, i64> = HashMap::new();
        for (group, members) in &existing {
            let mut ids: Vec<i64> = members.iter().map(|m| m.document_id).collect();
            ids.sort_unstable();
            existing_by_members.insert(ids, group.id);
        }

        let mut plan = ReconcilePlan::default();
        let mut matched: HashSet<i64> = HashSet::new();

        for draft in drafts {
            let mut ids: Vec<i64> = draft.members.iter().map(|m| m.document_id).collect();
            ids.sort_unstable();
            match existing_by_members.get(&ids) {
                Some(&group_id) => {
                    matched.insert(group_id);
                    plan.updates.push(GroupUpdate {
                        id: group_id,
                        scores: draft.scores,
                        algorithm_version: draft.algorithm_version,
                        members: force.then_some(draft.members),
                    });
                }
                None => plan.inserts.push(draft),
            }
        }

        for (group, _) in &existing {
            if !matched.contains(&group.id) {
                plan.deletes.push(group.id);
            }
        }
        Ok(plan)
    }
}

/// A candidate pair that survived full scoring.
struct ScoredPair {
    a: i64,
    b: i64,
    result: SimilarityResult,
}

fn scoring_record(doc: &CorpusDocument) -> ScoringRecord {
    ScoringRecord {
        document_id: doc.document_id,
        title: doc.title.clone(),
        normalized_text: doc.normalized_text.clone(),
        correspondent: doc.correspondent.clone(),
        document_type: doc.document_type.clone(),
        file_size: doc.archive_size.or(doc.original_size),
        created_at: doc.created_at,
    }
}

/// Primary member: greatest archive file size, ties broken by lowest
/// upstream id.
fn choose_primary(members: &[i64], by_id: &HashMap<i64, &CorpusDocument>) -> i64 {
    let mut best = members[0];
    let mut best_key = primary_key(by_id, best);
    for &member in &members[1..] {
        let key = primary_key(by_id, member);
        if key > best_key {
            best = member;
            best_key = key;
        }
    }
    best
}

fn primary_key(by_id: &HashMap<i64, &CorpusDocument>, document_id: i64) -> (i64, i64) {
    match by_id.get(&document_id) {
        Some(doc) => (doc.archive_size.unwrap_or(i64::MIN), -doc.upstream_id),
        None => (i64::MIN, -document_id),
    }
}

fn median(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    Some(if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_even_empty() {
        assert_eq!(median([0.2, 0.8, 0.5].into_iter()), Some(0.5));
        assert!((median([0.2, 0.4].into_iter()).unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(median(std::iter::empty()), None);
    }

    #[test]
    fn test_choose_primary_prefers_archive_size_then_lowest_upstream() {
        let docs = vec![
            CorpusDocument {
                document_id: 1,
                upstream_id: 11,
                title: "a".into(),
                correspondent: None,
                document_type: None,
                original_size: None,
                archive_size: Some(100),
                created_at: None,
                normalized_text: String::new(),
                word_count: 0,
                content_hash: String::new(),
            },
            CorpusDocument {
                document_id: 2,
                upstream_id: 5,
                title: "b".into(),
                correspondent: None,
                document_type: None,
                original_size: None,
                archive_size: Some(100),
                created_at: None,
                normalized_text: String::new(),
                word_count: 0,
                content_hash: String::new(),
            },
            CorpusDocument {
                document_id: 3,
                upstream_id: 1,
                title: "c".into(),
                correspondent: None,
                document_type: None,
                original_size: None,
                archive_size: Some(10),
                created_at: None,
                normalized_text: String::new(),
                word_count: 0,
                content_hash: String::new(),
            },
        ];
        let by_id: HashMap<i64, &CorpusDocument> =
            docs.iter().map(|d| (d.document_id, d)).collect();

        // Equal sizes: the lower upstream id (doc 2) wins; the bigger
        // archive beats the lower upstream id of doc 3.
        assert_eq!(choose_primary(&[1, 2, 3], &by_id), 2);
    }
}
