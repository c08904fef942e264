//! Domain models owned by the store
//!
//! One type per persisted entity, plus the write-plan types the analysis
//! commit uses. Other crates borrow these read-only; every mutation goes
//! through [`crate::SqliteStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StorageError};

// ============================================================================
// Enums
// ============================================================================

/// Per-document processing status, reset to `Pending` whenever the
/// fingerprint changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Completed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "completed" => Ok(ProcessingStatus::Completed),
            other => Err(StorageError::serialization(format!(
                "unknown processing status: {other}"
            ))),
        }
    }
}

/// Operator-facing state of a duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Pending,
    FalsePositive,
    Ignored,
    Deleted,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Pending => "pending",
            GroupStatus::FalsePositive => "false_positive",
            GroupStatus::Ignored => "ignored",
            GroupStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(GroupStatus::Pending),
            "false_positive" => Ok(GroupStatus::FalsePositive),
            "ignored" => Ok(GroupStatus::Ignored),
            "deleted" => Ok(GroupStatus::Deleted),
            other => Err(StorageError::serialization(format!(
                "unknown group status: {other}"
            ))),
        }
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a long-running task. At most one job per kind may be active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Sync,
    Analysis,
    BatchOperation,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Sync => "sync",
            JobKind::Analysis => "analysis",
            JobKind::BatchOperation => "batch_operation",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "sync" => Ok(JobKind::Sync),
            "analysis" => Ok(JobKind::Analysis),
            "batch_operation" => Ok(JobKind::BatchOperation),
            other => Err(StorageError::serialization(format!(
                "unknown job kind: {other}"
            ))),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(StorageError::serialization(format!(
                "unknown job status: {other}"
            ))),
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Documents
// ============================================================================

/// One row per upstream document. Never deleted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub upstream_id: i64,
    pub title: String,
    /// Resolved correspondent name (not the upstream id).
    pub correspondent: Option<String>,
    /// Resolved document-type name.
    pub document_type: Option<String>,
    /// Sorted tag names.
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub added_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    /// `modified` exactly as received from upstream; fingerprint input.
    pub modified_raw: String,
    pub processing_status: ProcessingStatus,
    pub original_size: Option<i64>,
    pub archive_size: Option<i64>,
    /// Change-detection fingerprint, non-null once synced.
    pub fingerprint: String,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Insert/update payload for a document row. File sizes are back-filled
/// separately and never touched by the upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub upstream_id: i64,
    pub title: String,
    pub correspondent: Option<String>,
    pub document_type: Option<String>,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub added_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_raw: String,
    pub processing_status: ProcessingStatus,
    pub fingerprint: String,
    pub last_synced_at: DateTime<Utc>,
}

/// One-to-one content row for a document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentContent {
    pub document_id: i64,
    pub full_text: String,
    pub normalized_text: String,
    pub word_count: i64,
    pub content_hash: String,
}

/// Persisted MinHash signature for a document.
///
/// `signature` is the raw little-endian u32 buffer; its byte length is
/// always `permutations * 4`. `content_hash` is the content hash the
/// signature was computed from, used to decide reuse.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSignature {
    pub document_id: i64,
    pub signature: Vec<u8>,
    pub algorithm_version: String,
    pub permutations: i64,
    pub content_hash: String,
}

/// Flattened document + content row feeding the analysis run.
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    pub document_id: i64,
    pub upstream_id: i64,
    pub title: String,
    pub correspondent: Option<String>,
    pub document_type: Option<String>,
    pub original_size: Option<i64>,
    pub archive_size: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub normalized_text: String,
    pub word_count: i64,
    pub content_hash: String,
}

// ============================================================================
// Duplicate groups
// ============================================================================

/// Component-wise similarity scores of a group.
///
/// All four components are persisted so both historical weight shapes
/// (jaccard+fuzzy and the four-component one) are representable without
/// a migration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupScores {
    pub confidence: f64,
    pub jaccard: f64,
    pub fuzzy: f64,
    pub metadata: Option<f64>,
    pub filename: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub id: i64,
    pub scores: GroupScores,
    pub algorithm_version: String,
    pub status: GroupStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateMember {
    pub group_id: i64,
    pub document_id: i64,
    pub is_primary: bool,
}

/// Member of a group about to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberDraft {
    pub document_id: i64,
    pub is_primary: bool,
}

/// A new group the analyser wants inserted.
#[derive(Debug, Clone)]
pub struct GroupDraft {
    pub scores: GroupScores,
    pub algorithm_version: String,
    pub members: Vec<MemberDraft>,
}

/// An existing group the analyser wants refreshed.
///
/// `members` is `Some` only on a forced run: membership is rewritten, the
/// primary comes from the drafts and the status resets to pending. On a
/// normal run only the scores are refreshed.
#[derive(Debug, Clone)]
pub struct GroupUpdate {
    pub id: i64,
    pub scores: GroupScores,
    pub algorithm_version: String,
    pub members: Option<Vec<MemberDraft>>,
}

/// The reconcile outcome of one analysis run, applied in one transaction.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub inserts: Vec<GroupDraft>,
    pub updates: Vec<GroupUpdate>,
    pub deletes: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReconcileCounts {
    pub created: u32,
    pub updated: u32,
    pub removed: u32,
}

// ============================================================================
// Jobs
// ============================================================================

/// Persisted state of a long-running task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub public_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: f64,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Sync state
// ============================================================================

/// Singleton row of sync/analysis bookkeeping and cumulative counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_analysis_at: Option<DateTime<Utc>>,
    pub last_sync_document_count: i64,
    pub total_documents: i64,
    pub total_groups: i64,
    pub groups_actioned: i64,
    pub documents_deleted: i64,
    pub bytes_reclaimed: i64,
}

// ============================================================================
// Export view
// ============================================================================

/// One CSV export row: a group member joined with its document and group.
#[derive(Debug, Clone)]
pub struct MemberExportRow {
    pub group_id: i64,
    pub confidence: f64,
    pub jaccard: f64,
    pub fuzzy: f64,
    pub group_status: GroupStatus,
    pub is_primary: bool,
    pub upstream_id: i64,
    pub title: String,
    pub correspondent: Option<String>,
    pub document_type: Option<String>,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub word_count: Option<i64>,
    pub group_created_at: DateTime<Utc>,
}
