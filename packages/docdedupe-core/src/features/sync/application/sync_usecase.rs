//! Pull-and-diff synchronisation
//!
//! Walks the upstream document listing (descending `modified`),
//! fingerprints every document and upserts only what changed. Incremental
//! runs stop early once a page reaches below the last sync timestamp,
//! which relies on the upstream's `-modified` ordering; if that ordering
//! is ever violated, missed updates heal on the next full sync.
//!
//! Per-document failures are counted and reported, never fatal, until
//! they pass a sanity threshold. File sizes are back-filled after the
//! page walk with bounded concurrency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use docdedupe_storage::{DocumentContent, NewDocument, ProcessingStatus, SqliteStore};

use crate::features::config::DedupConfig;
use crate::features::jobs::{CancelProbe, ProgressSink};
use crate::features::normalize::normalize;
use crate::features::sync::domain::fingerprint::fingerprint;
use crate::features::sync::infrastructure::{UpstreamClient, UpstreamDocument};
use crate::shared::error::{DedupeError, Result};

/// In-flight metadata requests during the back-fill.
const BACKFILL_CONCURRENCY: usize = 5;

/// Errors reported verbatim; the rest collapse into "+N more".
const MAX_REPORTED_ERRORS: usize = 10;

/// Per-document failures tolerated before the run aborts.
const MAX_DOCUMENT_FAILURES: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Full,
    Incremental,
}

/// Result payload of one sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub sync_type: SyncType,
    pub fetched: u32,
    pub inserted: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Pull-and-diff engine over one upstream store.
pub struct SyncEngine {
    store: SqliteStore,
    client: Arc<dyn UpstreamClient>,
    config: DedupConfig,
}

impl SyncEngine {
    pub fn new(store: SqliteStore, client: Arc<dyn UpstreamClient>, config: DedupConfig) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    pub async fn run(
        &self,
        force_full: bool,
        progress: &ProgressSink,
        cancel: &CancelProbe,
    ) -> Result<SyncOutcome> {
        let started = Instant::now();
        let state = self.store.sync_state()?;
        let sync_type = if force_full || state.last_sync_at.is_none() {
            SyncType::Full
        } else {
            SyncType::Incremental
        };
        let last_sync_at = state.last_sync_at;
        info!(?sync_type, "sync started");

        progress(0.01, "loading reference data");
        let tag_names = name_map(self.client.tags().await?);
        let correspondent_names = name_map(self.client.correspondents().await?);
        let type_names = name_map(self.client.document_types().await?);

        progress(0.03, "loading local document index");
        let index = self.store.upstream_index()?;
        cancel.check()?;

        let mut outcome = SyncOutcome {
            sync_type,
            fetched: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            errors: Vec::new(),
            duration_ms: 0,
        };
        let mut all_errors: Vec<String> = Vec::new();
        let mut backfill: Vec<(i64, i64)> = Vec::new();

        let mut page = self.client.documents_first_page().await?;
        let expected_total = page.count.unwrap_or(0).max(1) as f32;

        loop {
            let mut page_oldest: Option<DateTime<Utc>> = None;

            for doc in &page.results {
                outcome.fetched += 1;

                match self.sync_one(doc, &tag_names, &correspondent_names, &type_names, &index) {
                    Ok(SyncAction::Inserted(local_id)) => {
                        outcome.inserted += 1;
                        backfill.push((local_id, doc.id));
                    }
                    Ok(SyncAction::Updated(local_id)) => {
                        outcome.updated += 1;
                        backfill.push((local_id, doc.id));
                    }
                    Ok(SyncAction::Skipped) => outcome.skipped += 1,
                    Err(err) => {
                        outcome.failed += 1;
                        all_errors.push(format!("document {}: {err}", doc.id));
                        if outcome.failed > MAX_DOCUMENT_FAILURES {
                            return Err(DedupeError::upstream_transient(format!(
                                "aborting sync after {} per-document failures",
                                outcome.failed
                            )));
                        }
                    }
                }

                if let Ok(modified) = parse_timestamp(&doc.modified) {
                    page_oldest = Some(match page_oldest {
                        Some(current) => current.min(modified),
                        None => modified,
                    });
                }
            }

            let fraction = 0.05 + 0.80 * (outcome.fetched as f32 / expected_total).min(1.0);
            progress(
                fraction.clamp(0.05, 0.85),
                &format!("synced {} documents", outcome.fetched),
            );
            cancel.check()?;

            // Early stop: everything below this page predates the last
            // sync, and the listing is ordered by -modified.
            if sync_type == SyncType::Incremental {
                if let (Some(oldest), Some(last)) = (page_oldest, last_sync_at) {
                    if oldest < last {
                        debug!(%oldest, %last, "incremental early stop");
                        break;
                    }
                }
            }

            match page.next.take() {
                Some(next_url) => page = self.client.documents_page(&next_url).await?,
                None => break,
            }
        }

        progress(0.85, "back-filling file sizes");
        self.backfill_sizes(&backfill, &mut outcome, &mut all_errors)
            .await;
        progress(0.95, "committing sync state");

        self.store
            .commit_sync_state(Utc::now(), outcome.fetched as i64)?;

        outcome.errors = bound_errors(all_errors);
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        progress(1.0, "sync complete");
        info!(
            fetched = outcome.fetched,
            inserted = outcome.inserted,
            updated = outcome.updated,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "sync finished"
        );
        Ok(outcome)
    }

    /// Fingerprint one upstream document and upsert it if new/changed.
    fn sync_one(
        &self,
        doc: &UpstreamDocument,
        tag_names: &HashMap<i64, String>,
        correspondent_names: &HashMap<i64, String>,
        type_names: &HashMap<i64, String>,
        index: &HashMap<i64, (i64, String)>,
    ) -> Result<SyncAction> {
        let print = fingerprint(
            &doc.title,
            &doc.content,
            &doc.modified,
            &doc.tags,
            doc.correspondent,
            doc.document_type,
        );

        let known = index.get(&doc.id);
        if let Some((_, existing_print)) = known {
            if existing_print == &print {
                return Ok(SyncAction::Skipped);
            }
        }

        let mut tags: Vec<String> = doc
            .tags
            .iter()
            .filter_map(|id| tag_names.get(id).cloned())
            .collect();
        tags.sort_unstable();

        let modified_at = parse_timestamp(&doc.modified).ok();
        let record = NewDocument {
            upstream_id: doc.id,
            title: doc.title.clone(),
            correspondent: doc
                .correspondent
                .and_then(|id| correspondent_names.get(&id).cloned()),
            document_type: doc.document_type.and_then(|id| type_names.get(&id).cloned()),
            tags,
            created_at: doc.created.as_deref().and_then(|s| parse_timestamp(s).ok()),
            added_at: doc.added.as_deref().and_then(|s| parse_timestamp(s).ok()),
            modified_at,
            modified_raw: doc.modified.clone(),
            processing_status: ProcessingStatus::Pending,
            fingerprint: print,
            last_synced_at: Utc::now(),
        };
        let local_id = self.store.upsert_document(&record)?;

        let full_text = truncate_chars(&doc.content, self.config.max_ocr_length as usize);
        let normalized = normalize(full_text);
        self.store.upsert_content(&DocumentContent {
            document_id: local_id,
            full_text: full_text.to_string(),
            normalized_text: normalized.text,
            word_count: normalized.word_count as i64,
            content_hash: normalized.content_hash,
        })?;

        if known.is_some() {
            Ok(SyncAction::Updated(local_id))
        } else {
            Ok(SyncAction::Inserted(local_id))
        }
    }

    /// Fan out metadata requests with bounded concurrency; failures are
    /// logged and counted, never fatal.
    async fn backfill_sizes(
        &self,
        targets: &[(i64, i64)],
        outcome: &mut SyncOutcome,
        all_errors: &mut Vec<String>,
    ) {
        let semaphore = Arc::new(Semaphore::new(BACKFILL_CONCURRENCY));
        let mut tasks: JoinSet<std::result::Result<(), String>> = JoinSet::new();

        for &(local_id, upstream_id) in targets {
            let semaphore = Arc::clone(&semaphore);
            let client = Arc::clone(&self.client);
            let store = self.store.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| "semaphore closed".to_string())?;
                let meta = client
                    .document_metadata(upstream_id)
                    .await
                    .map_err(|err| format!("metadata for document {upstream_id}: {err}"))?;
                store
                    .set_file_sizes(local_id, meta.original_size, meta.archive_size)
                    .map_err(|err| format!("sizes for document {upstream_id}: {err}"))?;
                Ok(())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(message)) => {
                    warn!(%message, "file-size back-fill failed");
                    outcome.failed += 1;
                    all_errors.push(message);
                }
                Err(join_err) => {
                    warn!(%join_err, "back-fill task crashed");
                    outcome.failed += 1;
                    all_errors.push(format!("back-fill task crashed: {join_err}"));
                }
            }
        }
    }
}

enum SyncAction {
    Inserted(i64),
    Updated(i64),
    Skipped,
}

fn name_map(refs: Vec<crate::features::sync::infrastructure::NameRef>) -> HashMap<i64, String> {
    refs.into_iter().map(|r| (r.id, r.name)).collect()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            DedupeError::upstream_permanent(format!("unparseable timestamp {raw:?}"))
                .with_source(err)
        })
}

/// Longest prefix holding at most `max_chars` characters, on a UTF-8
/// boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn bound_errors(mut errors: Vec<String>) -> Vec<String> {
    if errors.len() > MAX_REPORTED_ERRORS {
        let extra = errors.len() - MAX_REPORTED_ERRORS;
        errors.truncate(MAX_REPORTED_ERRORS);
        errors.push(format!("+{extra} more"));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_boundary_safe() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("äöüß", 2), "äö");
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2026-03-01T10:00:00Z").is_ok());
        assert!(parse_timestamp("2026-03-01T10:00:00+02:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_bound_errors() {
        let errors: Vec<String> = (0..14).map(|i| format!("e{i}")).collect();
        let bounded = bound_errors(errors);
        assert_eq!(bounded.len(), MAX_REPORTED_ERRORS + 1);
        assert_eq!(bounded.last().unwrap(), "+4 more");

        let few = bound_errors(vec!["one".to_string()]);
        assert_eq!(few, vec!["one".to_string()]);
    }
}
