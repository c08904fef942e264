//! Schema management
//!
//! The full DDL lives in one script. Its SHA-256 is recorded under
//! `schema.hash` in `app_config`; the script is re-applied only when the
//! hash changes. Everything in the script is additive
//! (`CREATE ... IF NOT EXISTS`), so re-application is safe.
//!
//! Changes that additive DDL cannot express run as pre-DDL migrations,
//! guarded by column-existence checks so they are idempotent.

use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::Result;

/// Key under which the schema hash is stored.
pub const SCHEMA_HASH_KEY: &str = "schema.hash";

/// Key prefix for schema metadata; stripped from config backups.
pub const SCHEMA_META_PREFIX: &str = "schema.";

pub const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY,
    upstream_id INTEGER NOT NULL UNIQUE,
    title TEXT NOT NULL DEFAULT '',
    correspondent TEXT,
    document_type TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER,
    added_at INTEGER,
    modified_at INTEGER,
    modified_raw TEXT NOT NULL DEFAULT '',
    processing_status TEXT NOT NULL DEFAULT 'pending'
        CHECK (processing_status IN ('pending', 'completed')),
    original_size INTEGER,
    archive_size INTEGER,
    fingerprint TEXT NOT NULL,
    last_synced_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_documents_modified
    ON documents(modified_at);

CREATE TABLE IF NOT EXISTS document_content (
    document_id INTEGER PRIMARY KEY
        REFERENCES documents(id) ON DELETE CASCADE,
    full_text TEXT NOT NULL,
    normalized_text TEXT NOT NULL,
    word_count INTEGER NOT NULL,
    content_hash TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_content_word_count
    ON document_content(word_count);

CREATE TABLE IF NOT EXISTS document_signatures (
    document_id INTEGER PRIMARY KEY
        REFERENCES documents(id) ON DELETE CASCADE,
    signature BLOB NOT NULL,
    algorithm_version TEXT NOT NULL,
    permutations INTEGER NOT NULL,
    content_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS duplicate_groups (
    id INTEGER PRIMARY KEY,
    confidence REAL NOT NULL,
    jaccard REAL NOT NULL,
    fuzzy REAL NOT NULL,
    metadata_score REAL,
    filename_score REAL,
    algorithm_version TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'false_positive', 'ignored', 'deleted')),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS duplicate_members (
    group_id INTEGER NOT NULL
        REFERENCES duplicate_groups(id) ON DELETE CASCADE,
    document_id INTEGER NOT NULL
        REFERENCES documents(id),
    is_primary INTEGER NOT NULL DEFAULT 0,
    UNIQUE (group_id, document_id)
);

CREATE INDEX IF NOT EXISTS idx_members_document
    ON duplicate_members(document_id);

CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY,
    public_id TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL
        CHECK (kind IN ('sync', 'analysis', 'batch_operation')),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'running', 'completed', 'failed', 'cancelled')),
    progress REAL NOT NULL DEFAULT 0.0,
    message TEXT,
    result TEXT,
    error TEXT,
    created_at INTEGER NOT NULL,
    started_at INTEGER,
    completed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_jobs_kind_status
    ON jobs(kind, status);

CREATE TABLE IF NOT EXISTS sync_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_sync_at INTEGER,
    last_analysis_at INTEGER,
    last_sync_document_count INTEGER NOT NULL DEFAULT 0,
    total_documents INTEGER NOT NULL DEFAULT 0,
    total_groups INTEGER NOT NULL DEFAULT 0,
    groups_actioned INTEGER NOT NULL DEFAULT 0,
    documents_deleted INTEGER NOT NULL DEFAULT 0,
    bytes_reclaimed INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO sync_state (id) VALUES (1);
";

/// Hex SHA-256 of the DDL script.
pub fn schema_hash() -> String {
    hex::encode(Sha256::digest(SCHEMA_DDL.as_bytes()))
}

/// Ensure the schema is current: run pre-DDL migrations, apply the DDL if
/// its hash changed, and record the new hash.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    // app_config must exist before the hash can be read.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    let current = schema_hash();
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM app_config WHERE key = ?1",
            [SCHEMA_HASH_KEY],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    if stored.as_deref() == Some(current.as_str()) {
        return Ok(());
    }

    migrate_group_status_enum(conn)?;
    backfill_additive_columns(conn)?;

    conn.execute_batch(SCHEMA_DDL)?;
    conn.execute(
        "INSERT INTO app_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![SCHEMA_HASH_KEY, current],
    )?;
    info!(hash = %current, "schema applied");
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    if !table_exists(conn, table)? {
        return Ok(());
    }
    if !column_exists(conn, table, column)? {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"), [])?;
    }
    Ok(())
}

/// `CREATE TABLE IF NOT EXISTS` never touches pre-existing tables, so
/// columns added after first release are back-filled here.
fn backfill_additive_columns(conn: &Connection) -> Result<()> {
    ensure_column(conn, "duplicate_groups", "metadata_score", "REAL")?;
    ensure_column(conn, "duplicate_groups", "filename_score", "REAL")?;
    ensure_column(conn, "documents", "modified_raw", "TEXT NOT NULL DEFAULT ''")?;
    ensure_column(conn, "document_signatures", "content_hash", "TEXT NOT NULL DEFAULT ''")?;
    Ok(())
}

/// Migrate the historical `(reviewed, resolved)` boolean pair on
/// `duplicate_groups` to the `status` enum.
///
/// Mapping: `resolved = 1` → `deleted`, `reviewed = 1` → `ignored`,
/// otherwise `pending`. Idempotent: a second call finds no boolean
/// columns and does nothing.
fn migrate_group_status_enum(conn: &Connection) -> Result<()> {
    if !table_exists(conn, "duplicate_groups")? {
        return Ok(());
    }
    if !column_exists(conn, "duplicate_groups", "reviewed")? {
        return Ok(());
    }

    info!("migrating duplicate_groups boolean pair to status enum");

    if !column_exists(conn, "duplicate_groups", "status")? {
        conn.execute(
            "ALTER TABLE duplicate_groups ADD COLUMN status TEXT NOT NULL DEFAULT 'pending'",
            [],
        )?;
    }

    conn.execute(
        "UPDATE duplicate_groups SET status = CASE
            WHEN resolved = 1 THEN 'deleted'
            WHEN reviewed = 1 THEN 'ignored'
            ELSE 'pending'
         END",
        [],
    )?;

    conn.execute("ALTER TABLE duplicate_groups DROP COLUMN reviewed", [])?;
    conn.execute("ALTER TABLE duplicate_groups DROP COLUMN resolved", [])?;
    Ok(())
}
