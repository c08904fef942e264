//! docdedupe-storage: embedded store for the dedup engine
//!
//! Owns every persisted entity: documents, content, MinHash signatures,
//! duplicate groups and members, jobs, sync state and the string-keyed
//! app config. One SQLite file, WAL journaling, enforced foreign keys.
//!
//! Core contracts:
//!
//! 1. **Exclusive ownership**: other crates read through the returned
//!    models and mutate only through [`SqliteStore`] operations.
//! 2. **Atomic rebuilds**: `apply_reconcile` / `replace_groups` commit a
//!    whole analysis result or nothing; observers never see a partial
//!    group rebuild.
//! 3. **Schema hashing**: DDL is re-applied only when its SHA-256
//!    changes; non-additive changes ship as idempotent pre-DDL
//!    migrations guarded by column-existence checks.
//!
//! ```rust,ignore
//! use docdedupe_storage::{SqliteStore, JobKind};
//!
//! let store = SqliteStore::open("dedupe.db")?;
//! store.recover_interrupted_jobs("Job interrupted by application restart")?;
//! let job = store.create_job(JobKind::Sync)?;
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};
pub use infrastructure::sqlite::schema::{SCHEMA_META_PREFIX, SCHEMA_HASH_KEY};
pub use infrastructure::SqliteStore;

pub use domain::{
    CorpusDocument, Document, DocumentContent, DocumentSignature, DuplicateGroup, DuplicateMember,
    GroupDraft, GroupScores, GroupStatus, GroupUpdate, Job, JobKind, JobStatus, MemberDraft,
    MemberExportRow, NewDocument, ProcessingStatus, ReconcileCounts, ReconcilePlan, SyncState,
};
