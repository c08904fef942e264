//! SQLite store
//!
//! Single embedded database owning every persisted entity. Opened with
//! WAL journaling, enforced foreign keys and a busy timeout large enough
//! to absorb contention between the analyser and operator reads.
//!
//! Writers that must be atomic (`commit_analysis`, `apply_reconcile`,
//! `replace_groups`, `apply_config_update`) run inside one rusqlite
//! transaction; everything else is a single statement. Write failures
//! surface as [`StorageError`]; there is no retry at this layer.

pub mod schema;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::domain::{
    CorpusDocument, Document, DocumentContent, DocumentSignature, DuplicateGroup, DuplicateMember,
    GroupDraft, GroupScores, GroupStatus, Job, JobKind, JobStatus, MemberExportRow, NewDocument,
    ProcessingStatus, ReconcileCounts, ReconcilePlan, SyncState,
};
use crate::error::{Result, StorageError};

const BUSY_TIMEOUT_MS: u64 = 5_000;

fn to_ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn opt_ts(dt: Option<DateTime<Utc>>) -> Option<i64> {
    dt.map(to_ts)
}

fn opt_from_ts(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.map(from_ts)
}

/// SQLite-backed store. Cheap to clone; clones share one connection.
/// Workers that must not share a handle open their own instance against
/// the same database file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // journal_mode reports the resulting mode as a row; in-memory
        // databases answer "memory" instead of "wal".
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_row| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        schema::ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // Lock poisoning means a writer panicked mid-operation; the
        // connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// Insert or refresh a document row keyed by `upstream_id`. Returns
    /// the local id. File sizes are left untouched on update; they are
    /// back-filled via [`SqliteStore::set_file_sizes`].
    pub fn upsert_document(&self, doc: &NewDocument) -> Result<i64> {
        let conn = self.lock();
        let tags = serde_json::to_string(&doc.tags)?;
        let id = conn.query_row(
            "INSERT INTO documents
                (upstream_id, title, correspondent, document_type, tags,
                 created_at, added_at, modified_at, modified_raw,
                 processing_status, fingerprint, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(upstream_id) DO UPDATE SET
                 title = excluded.title,
                 correspondent = excluded.correspondent,
                 document_type = excluded.document_type,
                 tags = excluded.tags,
                 created_at = excluded.created_at,
                 added_at = excluded.added_at,
                 modified_at = excluded.modified_at,
                 modified_raw = excluded.modified_raw,
                 processing_status = excluded.processing_status,
                 fingerprint = excluded.fingerprint,
                 last_synced_at = excluded.last_synced_at
             RETURNING id",
            params![
                doc.upstream_id,
                doc.title,
                doc.correspondent,
                doc.document_type,
                tags,
                opt_ts(doc.created_at),
                opt_ts(doc.added_at),
                opt_ts(doc.modified_at),
                doc.modified_raw,
                doc.processing_status.as_str(),
                doc.fingerprint,
                to_ts(doc.last_synced_at),
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Overwrite an existing document row by local id. File sizes are
    /// untouched, as with the upsert.
    pub fn update_document(&self, id: i64, doc: &NewDocument) -> Result<()> {
        let conn = self.lock();
        let tags = serde_json::to_string(&doc.tags)?;
        let changed = conn.execute(
            "UPDATE documents SET
                 upstream_id = ?2, title = ?3, correspondent = ?4,
                 document_type = ?5, tags = ?6, created_at = ?7, added_at = ?8,
                 modified_at = ?9, modified_raw = ?10, processing_status = ?11,
                 fingerprint = ?12, last_synced_at = ?13
             WHERE id = ?1",
            params![
                id,
                doc.upstream_id,
                doc.title,
                doc.correspondent,
                doc.document_type,
                tags,
                opt_ts(doc.created_at),
                opt_ts(doc.added_at),
                opt_ts(doc.modified_at),
                doc.modified_raw,
                doc.processing_status.as_str(),
                doc.fingerprint,
                to_ts(doc.last_synced_at),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("document", id));
        }
        Ok(())
    }

    pub fn document(&self, id: i64) -> Result<Option<Document>> {
        let conn = self.lock();
        conn.query_row(
            &format!("{DOCUMENT_SELECT} WHERE id = ?1"),
            params![id],
            map_document,
        )
        .optional()?
        .transpose()
    }

    pub fn document_by_upstream_id(&self, upstream_id: i64) -> Result<Option<Document>> {
        let conn = self.lock();
        conn.query_row(
            &format!("{DOCUMENT_SELECT} WHERE upstream_id = ?1"),
            params![upstream_id],
            map_document,
        )
        .optional()?
        .transpose()
    }

    pub fn documents(&self) -> Result<Vec<Document>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{DOCUMENT_SELECT} ORDER BY id"))?;
        let rows = stmt.query_map([], map_document)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    /// Visit every document row without materialising the whole table.
    /// The callback runs under the connection lock; keep it cheap.
    pub fn for_each_document(&self, mut f: impl FnMut(Document) -> Result<()>) -> Result<()> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{DOCUMENT_SELECT} ORDER BY id"))?;
        let rows = stmt.query_map([], map_document)?;
        for row in rows {
            f(row??)?;
        }
        Ok(())
    }

    pub fn document_count(&self) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?)
    }

    /// `{upstream_id → (local id, fingerprint)}` for fast sync diffing.
    pub fn upstream_index(&self) -> Result<HashMap<i64, (i64, String)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT upstream_id, id, fingerprint FROM documents")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                (row.get::<_, i64>(1)?, row.get::<_, String>(2)?),
            ))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (upstream_id, entry) = row?;
            map.insert(upstream_id, entry);
        }
        Ok(map)
    }

    pub fn set_file_sizes(
        &self,
        document_id: i64,
        original_size: Option<i64>,
        archive_size: Option<i64>,
    ) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE documents SET original_size = ?2, archive_size = ?3 WHERE id = ?1",
            params![document_id, original_size, archive_size],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("document", document_id));
        }
        Ok(())
    }

    pub fn set_processing_status(&self, document_id: i64, status: ProcessingStatus) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE documents SET processing_status = ?2 WHERE id = ?1",
            params![document_id, status.as_str()],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("document", document_id));
        }
        Ok(())
    }

    // ========================================================================
    // Content
    // ========================================================================

    pub fn upsert_content(&self, content: &DocumentContent) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO document_content
                (document_id, full_text, normalized_text, word_count, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(document_id) DO UPDATE SET
                 full_text = excluded.full_text,
                 normalized_text = excluded.normalized_text,
                 word_count = excluded.word_count,
                 content_hash = excluded.content_hash",
            params![
                content.document_id,
                content.full_text,
                content.normalized_text,
                content.word_count,
                content.content_hash,
            ],
        )?;
        Ok(())
    }

    pub fn content(&self, document_id: i64) -> Result<Option<DocumentContent>> {
        let conn = self.lock();
        Ok(conn
            .query_row(
                "SELECT document_id, full_text, normalized_text, word_count, content_hash
                 FROM document_content WHERE document_id = ?1",
                params![document_id],
                |row| {
                    Ok(DocumentContent {
                        document_id: row.get(0)?,
                        full_text: row.get(1)?,
                        normalized_text: row.get(2)?,
                        word_count: row.get(3)?,
                        content_hash: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    /// All documents whose content passes the word-count gate, flattened
    /// for the analyser.
    pub fn analysis_corpus(&self, min_words: i64) -> Result<Vec<CorpusDocument>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT d.id, d.upstream_id, d.title, d.correspondent, d.document_type,
                    d.original_size, d.archive_size, d.created_at,
                    c.normalized_text, c.word_count, c.content_hash
             FROM documents d
             JOIN document_content c ON c.document_id = d.id
             WHERE c.word_count >= ?1
             ORDER BY d.id",
        )?;
        let rows = stmt.query_map(params![min_words], |row| {
            Ok(CorpusDocument {
                document_id: row.get(0)?,
                upstream_id: row.get(1)?,
                title: row.get(2)?,
                correspondent: row.get(3)?,
                document_type: row.get(4)?,
                original_size: row.get(5)?,
                archive_size: row.get(6)?,
                created_at: opt_from_ts(row.get(7)?),
                normalized_text: row.get(8)?,
                word_count: row.get(9)?,
                content_hash: row.get(10)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // ========================================================================
    // Signatures
    // ========================================================================

    pub fn upsert_signature(&self, sig: &DocumentSignature) -> Result<()> {
        let conn = self.lock();
        Self::upsert_signature_tx(&conn, sig)
    }

    fn upsert_signature_tx(conn: &Connection, sig: &DocumentSignature) -> Result<()> {
        if sig.signature.len() as i64 != sig.permutations * 4 {
            return Err(StorageError::serialization(format!(
                "signature byte length {} does not match permutations {}",
                sig.signature.len(),
                sig.permutations
            )));
        }
        conn.execute(
            "INSERT INTO document_signatures
                (document_id, signature, algorithm_version, permutations, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(document_id) DO UPDATE SET
                 signature = excluded.signature,
                 algorithm_version = excluded.algorithm_version,
                 permutations = excluded.permutations,
                 content_hash = excluded.content_hash",
            params![
                sig.document_id,
                sig.signature,
                sig.algorithm_version,
                sig.permutations,
                sig.content_hash,
            ],
        )?;
        Ok(())
    }

    pub fn signature(&self, document_id: i64) -> Result<Option<DocumentSignature>> {
        let conn = self.lock();
        Ok(conn
            .query_row(
                "SELECT document_id, signature, algorithm_version, permutations, content_hash
                 FROM document_signatures WHERE document_id = ?1",
                params![document_id],
                map_signature,
            )
            .optional()?)
    }

    pub fn signatures(&self) -> Result<Vec<DocumentSignature>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT document_id, signature, algorithm_version, permutations, content_hash
             FROM document_signatures ORDER BY document_id",
        )?;
        let rows = stmt.query_map([], map_signature)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // ========================================================================
    // Duplicate groups
    // ========================================================================

    pub fn groups(&self) -> Result<Vec<DuplicateGroup>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{GROUP_SELECT} ORDER BY id"))?;
        let rows = stmt.query_map([], map_group)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    pub fn group(&self, id: i64) -> Result<Option<DuplicateGroup>> {
        let conn = self.lock();
        conn.query_row(&format!("{GROUP_SELECT} WHERE id = ?1"), params![id], map_group)
            .optional()?
            .transpose()
    }

    pub fn members(&self, group_id: i64) -> Result<Vec<DuplicateMember>> {
        let conn = self.lock();
        Self::members_tx(&conn, group_id)
    }

    fn members_tx(conn: &Connection, group_id: i64) -> Result<Vec<DuplicateMember>> {
        let mut stmt = conn.prepare(
            "SELECT group_id, document_id, is_primary FROM duplicate_members
             WHERE group_id = ?1 ORDER BY document_id",
        )?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok(DuplicateMember {
                group_id: row.get(0)?,
                document_id: row.get(1)?,
                is_primary: row.get::<_, i64>(2)? != 0,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn groups_with_members(&self) -> Result<Vec<(DuplicateGroup, Vec<DuplicateMember>)>> {
        let groups = self.groups()?;
        let conn = self.lock();
        let mut out = Vec::with_capacity(groups.len());
        for group in groups {
            let members = Self::members_tx(&conn, group.id)?;
            out.push((group, members));
        }
        Ok(out)
    }

    pub fn set_group_status(&self, id: i64, status: GroupStatus) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE duplicate_groups SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), to_ts(Utc::now())],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("group", id));
        }
        Ok(())
    }

    /// Move the primary flag to `document_id`. Conflict if the document
    /// is not a member of the group.
    pub fn set_primary(&self, group_id: i64, document_id: i64) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let is_member: i64 = tx.query_row(
            "SELECT COUNT(*) FROM duplicate_members WHERE group_id = ?1 AND document_id = ?2",
            params![group_id, document_id],
            |row| row.get(0),
        )?;
        if is_member == 0 {
            return Err(StorageError::conflict(format!(
                "document {document_id} is not a member of group {group_id}"
            )));
        }
        tx.execute(
            "UPDATE duplicate_members SET is_primary = (document_id = ?2) WHERE group_id = ?1",
            params![group_id, document_id],
        )?;
        tx.execute(
            "UPDATE duplicate_groups SET updated_at = ?2 WHERE id = ?1",
            params![group_id, to_ts(Utc::now())],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_group(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute("DELETE FROM duplicate_groups WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::not_found("group", id));
        }
        Ok(())
    }

    /// Wholesale atomic rebuild: drop every group and insert the drafts.
    pub fn replace_groups(&self, drafts: &[GroupDraft]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM duplicate_members", [])?;
        tx.execute("DELETE FROM duplicate_groups", [])?;
        for draft in drafts {
            Self::insert_group_tx(&tx, draft)?;
        }
        Self::refresh_group_totals_tx(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// The single analysis commit: every new signature plus the group
    /// reconcile land in one transaction, or none of it does. A crash
    /// mid-analysis can therefore never leave fresh signatures beside a
    /// stale group table.
    pub fn commit_analysis(
        &self,
        signatures: &[DocumentSignature],
        plan: &ReconcilePlan,
    ) -> Result<ReconcileCounts> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for sig in signatures {
            Self::upsert_signature_tx(&tx, sig)?;
        }
        let counts = Self::apply_reconcile_tx(&tx, plan)?;
        tx.commit()?;
        Ok(counts)
    }

    /// Apply one analysis run's reconcile plan in a single transaction:
    /// update kept groups, insert new ones, delete vanished ones, then
    /// refresh the sync-state totals.
    pub fn apply_reconcile(&self, plan: &ReconcilePlan) -> Result<ReconcileCounts> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let counts = Self::apply_reconcile_tx(&tx, plan)?;
        tx.commit()?;
        Ok(counts)
    }

    fn apply_reconcile_tx(tx: &Transaction<'_>, plan: &ReconcilePlan) -> Result<ReconcileCounts> {
        let now = to_ts(Utc::now());

        for update in &plan.updates {
            let changed = tx.execute(
                "UPDATE duplicate_groups SET
                     confidence = ?2, jaccard = ?3, fuzzy = ?4,
                     metadata_score = ?5, filename_score = ?6,
                     algorithm_version = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    update.id,
                    update.scores.confidence,
                    update.scores.jaccard,
                    update.scores.fuzzy,
                    update.scores.metadata,
                    update.scores.filename,
                    update.algorithm_version,
                    now,
                ],
            )?;
            if changed == 0 {
                return Err(StorageError::not_found("group", update.id));
            }
            if let Some(members) = &update.members {
                tx.execute(
                    "UPDATE duplicate_groups SET status = 'pending' WHERE id = ?1",
                    params![update.id],
                )?;
                tx.execute(
                    "DELETE FROM duplicate_members WHERE group_id = ?1",
                    params![update.id],
                )?;
                Self::insert_members_tx(tx, update.id, members)?;
            }
        }

        for id in &plan.deletes {
            tx.execute("DELETE FROM duplicate_groups WHERE id = ?1", params![id])?;
        }

        for draft in &plan.inserts {
            Self::insert_group_tx(tx, draft)?;
        }

        Self::refresh_group_totals_tx(tx)?;

        Ok(ReconcileCounts {
            created: plan.inserts.len() as u32,
            updated: plan.updates.len() as u32,
            removed: plan.deletes.len() as u32,
        })
    }

    fn insert_group_tx(tx: &Transaction<'_>, draft: &GroupDraft) -> Result<i64> {
        let now = to_ts(Utc::now());
        tx.execute(
            "INSERT INTO duplicate_groups
                (confidence, jaccard, fuzzy, metadata_score, filename_score,
                 algorithm_version, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)",
            params![
                draft.scores.confidence,
                draft.scores.jaccard,
                draft.scores.fuzzy,
                draft.scores.metadata,
                draft.scores.filename,
                draft.algorithm_version,
                now,
            ],
        )?;
        let group_id = tx.last_insert_rowid();
        Self::insert_members_tx(tx, group_id, &draft.members)?;
        Ok(group_id)
    }

    fn insert_members_tx(
        tx: &Transaction<'_>,
        group_id: i64,
        members: &[crate::domain::MemberDraft],
    ) -> Result<()> {
        for member in members {
            tx.execute(
                "INSERT INTO duplicate_members (group_id, document_id, is_primary)
                 VALUES (?1, ?2, ?3)",
                params![group_id, member.document_id, member.is_primary as i64],
            )?;
        }
        Ok(())
    }

    fn refresh_group_totals_tx(tx: &Transaction<'_>) -> Result<()> {
        tx.execute(
            "UPDATE sync_state SET
                 total_groups = (SELECT COUNT(*) FROM duplicate_groups),
                 last_analysis_at = ?1
             WHERE id = 1",
            params![to_ts(Utc::now())],
        )?;
        Ok(())
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    /// Create a job of `kind`. The conditional insert enforces at most
    /// one pending/running job per kind; a loser gets `Conflict`.
    pub fn create_job(&self, kind: JobKind) -> Result<Job> {
        let conn = self.lock();
        let public_id = Uuid::new_v4().to_string();
        let now = to_ts(Utc::now());
        let changed = conn.execute(
            "INSERT INTO jobs (public_id, kind, status, progress, created_at)
             SELECT ?1, ?2, 'pending', 0.0, ?3
             WHERE NOT EXISTS (
                 SELECT 1 FROM jobs
                 WHERE kind = ?2 AND status IN ('pending', 'running')
             )",
            params![public_id, kind.as_str(), now],
        )?;
        if changed == 0 {
            return Err(StorageError::conflict(format!(
                "a {kind} job is already pending or running"
            )));
        }
        drop(conn);
        self.job(&public_id)?
            .ok_or_else(|| StorageError::not_found("job", &public_id))
    }

    pub fn job(&self, public_id: &str) -> Result<Option<Job>> {
        let conn = self.lock();
        conn.query_row(
            &format!("{JOB_SELECT} WHERE public_id = ?1"),
            params![public_id],
            map_job,
        )
        .optional()?
        .transpose()
    }

    pub fn job_by_id(&self, id: i64) -> Result<Option<Job>> {
        let conn = self.lock();
        conn.query_row(&format!("{JOB_SELECT} WHERE id = ?1"), params![id], map_job)
            .optional()?
            .transpose()
    }

    pub fn jobs(&self) -> Result<Vec<Job>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{JOB_SELECT} ORDER BY created_at DESC, id DESC"))?;
        let rows = stmt.query_map([], map_job)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    /// Cheap status poll for cancellation checks.
    pub fn job_status(&self, id: i64) -> Result<JobStatus> {
        let conn = self.lock();
        let status: String = conn
            .query_row("SELECT status FROM jobs WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| StorageError::not_found("job", id))?;
        JobStatus::parse(&status)
    }

    pub fn mark_job_running(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE jobs SET status = 'running', started_at = ?2 WHERE id = ?1 AND status = 'pending'",
            params![id, to_ts(Utc::now())],
        )?;
        if changed == 0 {
            return Err(StorageError::conflict(format!(
                "job {id} is not pending; cannot start"
            )));
        }
        Ok(())
    }

    /// Progress is clamped to `[0, 1]` on write. Terminal rows are left
    /// untouched so a late progress write cannot resurrect them.
    pub fn update_job_progress(&self, id: i64, progress: f64, message: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET progress = ?2, message = ?3
             WHERE id = ?1 AND status IN ('pending', 'running')",
            params![id, progress.clamp(0.0, 1.0), message],
        )?;
        Ok(())
    }

    pub fn complete_job(&self, id: i64, result: &serde_json::Value) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE jobs SET status = 'completed', progress = 1.0, result = ?2, completed_at = ?3
             WHERE id = ?1 AND status IN ('pending', 'running')",
            params![id, serde_json::to_string(result)?, to_ts(Utc::now())],
        )?;
        if changed == 0 {
            return Err(StorageError::conflict(format!(
                "job {id} is already terminal"
            )));
        }
        Ok(())
    }

    pub fn fail_job(&self, id: i64, error: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET status = 'failed', error = ?2, completed_at = ?3
             WHERE id = ?1 AND status IN ('pending', 'running')",
            params![id, error, to_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Flip a non-terminal job to `cancelled`. Returns `false` when the
    /// job was already terminal (a documented no-op).
    pub fn cancel_job(&self, public_id: &str) -> Result<bool> {
        let conn = self.lock();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM jobs WHERE public_id = ?1",
                params![public_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StorageError::not_found("job", public_id));
        }
        let changed = conn.execute(
            "UPDATE jobs SET status = 'cancelled', completed_at = ?2
             WHERE public_id = ?1 AND status IN ('pending', 'running')",
            params![public_id, to_ts(Utc::now())],
        )?;
        Ok(changed > 0)
    }

    /// Startup recovery: every pending/running job is marked failed.
    /// Runs before any new job is accepted.
    pub fn recover_interrupted_jobs(&self, message: &str) -> Result<u32> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE jobs SET status = 'failed', error = ?1, completed_at = ?2
             WHERE status IN ('pending', 'running')",
            params![message, to_ts(Utc::now())],
        )?;
        Ok(changed as u32)
    }

    // ========================================================================
    // Sync state
    // ========================================================================

    pub fn sync_state(&self) -> Result<SyncState> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT last_sync_at, last_analysis_at, last_sync_document_count,
                    total_documents, total_groups, groups_actioned,
                    documents_deleted, bytes_reclaimed
             FROM sync_state WHERE id = 1",
            [],
            |row| {
                Ok(SyncState {
                    last_sync_at: opt_from_ts(row.get(0)?),
                    last_analysis_at: opt_from_ts(row.get(1)?),
                    last_sync_document_count: row.get(2)?,
                    total_documents: row.get(3)?,
                    total_groups: row.get(4)?,
                    groups_actioned: row.get(5)?,
                    documents_deleted: row.get(6)?,
                    bytes_reclaimed: row.get(7)?,
                })
            },
        )?)
    }

    /// Commit the post-sync bookkeeping: timestamp, fetched count and the
    /// fresh document total.
    pub fn commit_sync_state(&self, last_sync_at: DateTime<Utc>, fetched: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE sync_state SET
                 last_sync_at = ?1,
                 last_sync_document_count = ?2,
                 total_documents = (SELECT COUNT(*) FROM documents)
             WHERE id = 1",
            params![to_ts(last_sync_at), fetched],
        )?;
        Ok(())
    }

    /// Advance the cumulative operator-action counters.
    pub fn record_group_action(&self, documents_deleted: i64, bytes_reclaimed: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE sync_state SET
                 groups_actioned = groups_actioned + 1,
                 documents_deleted = documents_deleted + ?1,
                 bytes_reclaimed = bytes_reclaimed + ?2
             WHERE id = 1",
            params![documents_deleted, bytes_reclaimed],
        )?;
        Ok(())
    }

    // ========================================================================
    // App config
    // ========================================================================

    pub fn config_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        Ok(conn
            .query_row(
                "SELECT value FROM app_config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn config_all(&self) -> Result<BTreeMap<String, String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = BTreeMap::new();
        for row in rows {
            let (k, v) = row?;
            map.insert(k, v);
        }
        Ok(map)
    }

    pub fn set_config_value(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        Self::set_config_tx(&conn, key, value)
    }

    fn set_config_tx(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn upsert_config(&self, entries: &[(String, String)]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO app_config (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Persist a validated config change together with the recomputed
    /// group confidences, atomically.
    pub fn apply_config_update(
        &self,
        entries: &[(String, String)],
        confidences: &[(i64, f64)],
    ) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO app_config (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
        }
        let now = to_ts(Utc::now());
        for (group_id, confidence) in confidences {
            tx.execute(
                "UPDATE duplicate_groups SET confidence = ?2, updated_at = ?3 WHERE id = ?1",
                params![group_id, confidence, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // Export view
    // ========================================================================

    /// One row per group member, joined for the CSV export. Ordered by
    /// group, primary first.
    pub fn member_export_rows(&self) -> Result<Vec<MemberExportRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT g.id, g.confidence, g.jaccard, g.fuzzy, g.status,
                    m.is_primary, d.upstream_id, d.title, d.correspondent,
                    d.document_type, d.tags, d.created_at, c.word_count,
                    g.created_at
             FROM duplicate_members m
             JOIN duplicate_groups g ON g.id = m.group_id
             JOIN documents d ON d.id = m.document_id
             LEFT JOIN document_content c ON c.document_id = d.id
             ORDER BY g.id, m.is_primary DESC, d.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)? != 0,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, Option<i64>>(11)?,
                row.get::<_, Option<i64>>(12)?,
                row.get::<_, i64>(13)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (
                group_id,
                confidence,
                jaccard,
                fuzzy,
                status,
                is_primary,
                upstream_id,
                title,
                correspondent,
                document_type,
                tags_json,
                created_at,
                word_count,
                group_created_at,
            ) = row?;
            out.push(MemberExportRow {
                group_id,
                confidence,
                jaccard,
                fuzzy,
                group_status: GroupStatus::parse(&status)?,
                is_primary,
                upstream_id,
                title,
                correspondent,
                document_type,
                tags: serde_json::from_str(&tags_json)?,
                created_at: opt_from_ts(created_at),
                word_count,
                group_created_at: from_ts(group_created_at),
            });
        }
        Ok(out)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

const DOCUMENT_SELECT: &str = "SELECT id, upstream_id, title, correspondent, document_type, tags,
        created_at, added_at, modified_at, modified_raw, processing_status,
        original_size, archive_size, fingerprint, last_synced_at
 FROM documents";

fn map_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Document>> {
    let tags_json: String = row.get(5)?;
    let status: String = row.get(10)?;
    Ok((|| {
        Ok(Document {
            id: row.get(0)?,
            upstream_id: row.get(1)?,
            title: row.get(2)?,
            correspondent: row.get(3)?,
            document_type: row.get(4)?,
            tags: serde_json::from_str(&tags_json)?,
            created_at: opt_from_ts(row.get(6)?),
            added_at: opt_from_ts(row.get(7)?),
            modified_at: opt_from_ts(row.get(8)?),
            modified_raw: row.get(9)?,
            processing_status: ProcessingStatus::parse(&status)?,
            original_size: row.get(11)?,
            archive_size: row.get(12)?,
            fingerprint: row.get(13)?,
            last_synced_at: opt_from_ts(row.get(14)?),
        })
    })())
}

fn map_signature(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentSignature> {
    Ok(DocumentSignature {
        document_id: row.get(0)?,
        signature: row.get(1)?,
        algorithm_version: row.get(2)?,
        permutations: row.get(3)?,
        content_hash: row.get(4)?,
    })
}

const GROUP_SELECT: &str = "SELECT id, confidence, jaccard, fuzzy, metadata_score, filename_score,
        algorithm_version, status, created_at, updated_at
 FROM duplicate_groups";

fn map_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<DuplicateGroup>> {
    let status: String = row.get(7)?;
    Ok((|| {
        Ok(DuplicateGroup {
            id: row.get(0)?,
            scores: GroupScores {
                confidence: row.get(1)?,
                jaccard: row.get(2)?,
                fuzzy: row.get(3)?,
                metadata: row.get(4)?,
                filename: row.get(5)?,
            },
            algorithm_version: row.get(6)?,
            status: GroupStatus::parse(&status)?,
            created_at: from_ts(row.get(8)?),
            updated_at: from_ts(row.get(9)?),
        })
    })())
}

const JOB_SELECT: &str = "SELECT id, public_id, kind, status, progress, message, result, error,
        created_at, started_at, completed_at
 FROM jobs";

fn map_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Job>> {
    let kind: String = row.get(2)?;
    let status: String = row.get(3)?;
    let result_json: Option<String> = row.get(6)?;
    Ok((|| {
        Ok(Job {
            id: row.get(0)?,
            public_id: row.get(1)?,
            kind: JobKind::parse(&kind)?,
            status: JobStatus::parse(&status)?,
            progress: row.get(4)?,
            message: row.get(5)?,
            result: result_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            error: row.get(7)?,
            created_at: from_ts(row.get(8)?),
            started_at: opt_from_ts(row.get(9)?),
            completed_at: opt_from_ts(row.get(10)?),
        })
    })())
}
