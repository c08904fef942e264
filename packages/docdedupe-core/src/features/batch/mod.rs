//! Batch group resolution
//!
//! The operator resolves clusters one of four ways: keep watching
//! (ignore), mark as a false positive, drop the group, or mark it
//! deleted while keeping the primary. This engine applies one action to
//! many groups as a cancellable `batch_operation` job and advances the
//! cumulative counters (`groups_actioned`, `documents_deleted`,
//! `bytes_reclaimed`).
//!
//! Deleting the non-primary files from the upstream store is the
//! operator UI's concern; the core records the resolution and the
//! reclaimed bytes.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use docdedupe_storage::{GroupStatus, SqliteStore};

use crate::features::jobs::{CancelProbe, ProgressSink};
use crate::shared::error::Result;

/// Operator resolution applied to each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchAction {
    /// Keep the group but stop surfacing it.
    Ignore,
    /// The cluster is not a duplicate set.
    MarkFalsePositive,
    /// Remove the group row entirely (members cascade, documents stay).
    DeleteGroup,
    /// Mark the group deleted and account for its non-primary members.
    DeleteNonPrimary,
}

/// One batch request: a single action over many groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub action: BatchAction,
    pub group_ids: Vec<i64>,
}

/// Result payload of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub processed: u32,
    pub failed: u32,
    pub documents_affected: u32,
    pub bytes_reclaimed: i64,
    pub errors: Vec<String>,
}

/// Applies operator resolutions group by group.
pub struct BatchEngine {
    store: SqliteStore,
}

impl BatchEngine {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    pub async fn run(
        &self,
        request: &BatchRequest,
        progress: &ProgressSink,
        cancel: &CancelProbe,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let total = request.group_ids.len().max(1);
        info!(action = ?request.action, groups = request.group_ids.len(), "batch started");

        for (i, &group_id) in request.group_ids.iter().enumerate() {
            cancel.check()?;

            match self.apply(request.action, group_id, &mut outcome) {
                Ok(()) => outcome.processed += 1,
                Err(err) => {
                    warn!(group_id, %err, "batch action failed");
                    outcome.failed += 1;
                    outcome.errors.push(format!("group {group_id}: {err}"));
                }
            }
            progress(
                (i + 1) as f32 / total as f32,
                &format!("resolved {} of {} groups", i + 1, request.group_ids.len()),
            );
        }

        info!(
            processed = outcome.processed,
            failed = outcome.failed,
            bytes_reclaimed = outcome.bytes_reclaimed,
            "batch finished"
        );
        Ok(outcome)
    }

    fn apply(&self, action: BatchAction, group_id: i64, outcome: &mut BatchOutcome) -> Result<()> {
        match action {
            BatchAction::Ignore => {
                self.store.set_group_status(group_id, GroupStatus::Ignored)?;
                self.store.record_group_action(0, 0)?;
            }
            BatchAction::MarkFalsePositive => {
                self.store
                    .set_group_status(group_id, GroupStatus::FalsePositive)?;
                self.store.record_group_action(0, 0)?;
            }
            BatchAction::DeleteGroup => {
                self.store.delete_group(group_id)?;
                self.store.record_group_action(0, 0)?;
            }
            BatchAction::DeleteNonPrimary => {
                let members = self.store.members(group_id)?;
                if members.is_empty() {
                    return Err(crate::shared::error::DedupeError::not_found(
                        "group", group_id,
                    ));
                }
                let mut documents = 0i64;
                let mut bytes = 0i64;
                for member in members.iter().filter(|m| !m.is_primary) {
                    documents += 1;
                    if let Some(doc) = self.store.document(member.document_id)? {
                        bytes += doc.archive_size.or(doc.original_size).unwrap_or(0);
                    }
                }
                self.store.set_group_status(group_id, GroupStatus::Deleted)?;
                self.store.record_group_action(documents, bytes)?;
                outcome.documents_affected += documents as u32;
                outcome.bytes_reclaimed += bytes;
            }
        }
        Ok(())
    }
}
