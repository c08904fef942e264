//! docdedupe-core: incremental document deduplication engine
//!
//! Feature-first layout:
//! - `shared/`   : error taxonomy, environment options
//! - `features/` : vertical slices (normalize → dedup → sync → jobs →
//!   config → export), each split into domain / application /
//!   infrastructure where the slice is big enough to warrant it
//!
//! The engine pulls documents from an upstream store ([`SyncEngine`]),
//! fingerprints them for change detection, and clusters near-duplicates
//! with MinHash + banded LSH + weighted scoring ([`Analyzer`]). Both run
//! as cancellable jobs coordinated purely through the store's job table
//! ([`JobManager`], [`Worker`]).
//!
//! ```rust,ignore
//! use docdedupe_core::{Analyzer, ConfigService, JobManager, Worker};
//! use docdedupe_core::jobs::{job_progress_sink, CancelProbe};
//! use docdedupe_storage::{JobKind, SqliteStore};
//!
//! let store = SqliteStore::open(&env.database_path)?;
//! let manager = JobManager::new(store.clone());
//! manager.recover_on_start()?;
//!
//! let job = manager.create(JobKind::Analysis)?;
//! let config = ConfigService::new(store.clone()).get()?;
//! let analyzer = Analyzer::new(store.clone(), config);
//! let progress = job_progress_sink(store.clone(), job.id);
//! let cancel = CancelProbe::new(store.clone(), job.id);
//! Worker::spawn(manager, job, async move {
//!     let outcome = analyzer.run(false, &progress, &cancel).await?;
//!     Ok(serde_json::to_value(outcome)?)
//! });
//! ```

pub mod features;
pub mod shared;

pub use features::batch::{BatchAction, BatchEngine, BatchOutcome, BatchRequest};
pub use features::config::{ConfigService, DedupConfig, DedupConfigPatch};
pub use features::dedup::{AnalysisOutcome, Analyzer};
pub use features::export::{ConfigBackup, ConfigBackupImport, ExportService};
pub use features::jobs::{self, CancelProbe, JobManager, ProgressSink, Worker};
pub use features::normalize::{normalize, Normalized};
pub use features::sync::{HttpUpstreamClient, SyncEngine, SyncOutcome, SyncType, UpstreamAuth};
pub use shared::{AppEnv, DedupeError, ErrorKind, Result};
