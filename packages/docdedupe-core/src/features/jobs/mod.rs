//! Job control surface
//!
//! The job table is the only state shared between a worker and its
//! launcher. [`JobManager`] persists lifecycle transitions,
//! [`Worker::spawn`] runs one job body in an isolated task and records
//! its outcome, and [`CancelProbe`] is the single source of truth for
//! cooperative cancellation: the worker polls `job.status` and returns
//! without writing a terminal state once it observes `cancelled`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use docdedupe_storage::{Job, JobKind, JobStatus, SqliteStore};

use crate::shared::error::{DedupeError, Result};

/// Message written over every pending/running job at process start.
pub const RESTART_MESSAGE: &str = "Job interrupted by application restart";

/// Progress callback handed into the long-running engines. Progress is
/// clamped to [0, 1] at the store layer.
pub type ProgressSink = Arc<dyn Fn(f32, &str) + Send + Sync>;

/// A sink that writes progress onto the job row. Write failures are
/// logged and dropped; progress is advisory.
pub fn job_progress_sink(store: SqliteStore, job_id: i64) -> ProgressSink {
    Arc::new(move |progress, message| {
        if let Err(err) = store.update_job_progress(job_id, progress as f64, message) {
            warn!(job_id, %err, "progress write failed");
        }
    })
}

/// A sink that discards progress (tests, ad-hoc runs).
pub fn null_progress_sink() -> ProgressSink {
    Arc::new(|_, _| {})
}

// ============================================================================
// JobManager
// ============================================================================

/// Thin persistence wrapper for job lifecycle transitions.
#[derive(Clone)]
pub struct JobManager {
    store: SqliteStore,
}

impl JobManager {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Create a job of `kind`. Fails with `Conflict` while another job
    /// of the same kind is pending or running.
    pub fn create(&self, kind: JobKind) -> Result<Job> {
        Ok(self.store.create_job(kind)?)
    }

    pub fn get(&self, public_id: &str) -> Result<Job> {
        self.store
            .job(public_id)?
            .ok_or_else(|| DedupeError::not_found("job", public_id))
    }

    /// Flip a non-terminal job to cancelled; no-op (returns false) on
    /// terminal jobs. The worker observes the flip at its next poll.
    pub fn cancel(&self, public_id: &str) -> Result<bool> {
        Ok(self.store.cancel_job(public_id)?)
    }

    /// Startup recovery: mark every pending/running job failed. Must run
    /// before any new job is accepted.
    pub fn recover_on_start(&self) -> Result<u32> {
        let recovered = self.store.recover_interrupted_jobs(RESTART_MESSAGE)?;
        if recovered > 0 {
            info!(recovered, "interrupted jobs failed on startup");
        }
        Ok(recovered)
    }
}

// ============================================================================
// CancelProbe
// ============================================================================

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Rate-limited poll of `job.status`. Once `cancelled` is observed the
/// probe stays cancelled.
pub struct CancelProbe {
    store: SqliteStore,
    job_id: i64,
    interval: Duration,
    state: Mutex<ProbeState>,
}

struct ProbeState {
    last_poll: Option<Instant>,
    cancelled: bool,
}

impl CancelProbe {
    pub fn new(store: SqliteStore, job_id: i64) -> Self {
        Self::with_interval(store, job_id, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(store: SqliteStore, job_id: i64, interval: Duration) -> Self {
        Self {
            store,
            job_id,
            interval,
            state: Mutex::new(ProbeState {
                last_poll: None,
                cancelled: false,
            }),
        }
    }

    /// A probe that never cancels (tests, ad-hoc runs).
    pub fn never(store: SqliteStore) -> Self {
        Self {
            store,
            job_id: -1,
            interval: Duration::MAX,
            state: Mutex::new(ProbeState {
                // A poll in the future keeps the probe off the store.
                last_poll: Some(Instant::now()),
                cancelled: false,
            }),
        }
    }

    /// True once the job row reads `cancelled`. At most one store poll
    /// per interval; callers may invoke this as often as they like.
    pub fn should_stop(&self) -> Result<bool> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.cancelled {
            return Ok(true);
        }
        if let Some(last) = state.last_poll {
            if last.elapsed() < self.interval {
                return Ok(false);
            }
        }
        state.last_poll = Some(Instant::now());
        let status = self.store.job_status(self.job_id)?;
        if status == JobStatus::Cancelled {
            state.cancelled = true;
        }
        Ok(state.cancelled)
    }

    /// `Err(Cancelled)` once cancellation is observed; for use with `?`
    /// at suspension points.
    pub fn check(&self) -> Result<()> {
        if self.should_stop()? {
            Err(DedupeError::cancelled())
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Runs one job body in isolation and records its outcome.
pub struct Worker;

impl Worker {
    /// Spawn `body` for `job` and supervise it. The body runs in its own
    /// task so a panic surfaces as a join error instead of tearing down
    /// the launcher; the supervisor consumes that handle exactly once.
    ///
    /// Outcome mapping:
    /// - `Ok(result)` → `completed` with the result payload
    /// - `Err(Cancelled)` → no terminal write (the row is already cancelled)
    /// - `Err(other)` → `failed` with the error message
    /// - panic/abort → `failed` with "Worker crashed: …"
    ///
    /// Callers hand the body its own store handle; the worker shares no
    /// mutable memory with the launcher.
    pub fn spawn<F>(manager: JobManager, job: Job, body: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        tokio::spawn(async move {
            if let Err(err) = manager.store().mark_job_running(job.id) {
                warn!(job = %job.public_id, %err, "job could not start");
                return;
            }

            let handle = tokio::spawn(body);
            match handle.await {
                Ok(Ok(result)) => {
                    if let Err(err) = manager.store().complete_job(job.id, &result) {
                        warn!(job = %job.public_id, %err, "completion write failed");
                    }
                }
                Ok(Err(err)) if err.is_cancelled() => {
                    info!(job = %job.public_id, "job observed cancellation");
                }
                Ok(Err(err)) => {
                    warn!(job = %job.public_id, %err, "job failed");
                    if let Err(write_err) = manager.store().fail_job(job.id, &err.to_string()) {
                        warn!(job = %job.public_id, %write_err, "failure write failed");
                    }
                }
                Err(join_err) => {
                    let message = format!("Worker crashed: {join_err}");
                    warn!(job = %job.public_id, %message, "worker crashed");
                    if let Err(write_err) = manager.store().fail_job(job.id, &message) {
                        warn!(job = %job.public_id, %write_err, "failure write failed");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docdedupe_storage::JobStatus;

    fn manager() -> JobManager {
        JobManager::new(SqliteStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_create_conflict_surfaces_as_conflict_kind() {
        let manager = manager();
        manager.create(JobKind::Sync).unwrap();
        let err = manager.create(JobKind::Sync).unwrap_err();
        assert_eq!(err.kind, crate::shared::error::ErrorKind::Conflict);
    }

    #[test]
    fn test_recover_on_start() {
        let manager = manager();
        let job = manager.create(JobKind::Analysis).unwrap();
        assert_eq!(manager.recover_on_start().unwrap(), 1);

        let job = manager.get(&job.public_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(RESTART_MESSAGE));
    }

    #[tokio::test]
    async fn test_worker_completes_job() {
        let manager = manager();
        let job = manager.create(JobKind::Sync).unwrap();

        let handle = Worker::spawn(
            manager.clone(),
            job.clone(),
            async move { Ok(serde_json::json!({"fetched": 3})) },
        );
        handle.await.unwrap();

        let job = manager.get(&job.public_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 1.0);
        assert_eq!(job.result.unwrap()["fetched"], 3);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_worker_records_failure() {
        let manager = manager();
        let job = manager.create(JobKind::Sync).unwrap();

        let handle = Worker::spawn(manager.clone(), job.clone(), async move {
            Err(DedupeError::internal("signature length mismatch"))
        });
        handle.await.unwrap();

        let job = manager.get(&job.public_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("signature length mismatch"));
    }

    #[tokio::test]
    async fn test_worker_panic_marks_crashed() {
        let manager = manager();
        let job = manager.create(JobKind::Analysis).unwrap();

        let handle = Worker::spawn(manager.clone(), job.clone(), async move {
            panic!("segfault in disguise");
        });
        handle.await.unwrap();

        let job = manager.get(&job.public_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().starts_with("Worker crashed:"));
    }

    #[tokio::test]
    async fn test_cancelled_body_leaves_row_cancelled() {
        let manager = manager();
        let job = manager.create(JobKind::Sync).unwrap();

        // Body spins on the probe until the launcher cancels the job.
        let store = manager.store().clone();
        let job_id = job.id;
        let handle = Worker::spawn(manager.clone(), job.clone(), async move {
            let probe = CancelProbe::with_interval(store, job_id, Duration::ZERO);
            loop {
                probe.check()?;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(manager.cancel(&job.public_id).unwrap());
        handle.await.unwrap();

        let job = manager.get(&job.public_id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.result.is_none());
    }

    #[test]
    fn test_cancel_terminal_is_noop() {
        let manager = manager();
        let job = manager.create(JobKind::Sync).unwrap();
        manager.store().mark_job_running(job.id).unwrap();
        manager
            .store()
            .complete_job(job.id, &serde_json::json!({}))
            .unwrap();

        assert!(!manager.cancel(&job.public_id).unwrap());
        assert_eq!(
            manager.get(&job.public_id).unwrap().status,
            JobStatus::Completed
        );
    }

    #[test]
    fn test_probe_rate_limits_polls() {
        let manager = manager();
        let job = manager.create(JobKind::Sync).unwrap();
        let probe = CancelProbe::with_interval(
            manager.store().clone(),
            job.id,
            Duration::from_secs(3600),
        );

        // First call polls; the row is active.
        assert!(!probe.should_stop().unwrap());
        manager.cancel(&job.public_id).unwrap();
        // Within the interval the cached answer wins.
        assert!(!probe.should_stop().unwrap());
    }

    #[tokio::test]
    async fn test_probe_observes_cancellation() {
        let manager = manager();
        let job = manager.create(JobKind::Sync).unwrap();
        let probe =
            CancelProbe::with_interval(manager.store().clone(), job.id, Duration::ZERO);

        assert!(!probe.should_stop().unwrap());
        manager.cancel(&job.public_id).unwrap();
        assert!(probe.should_stop().unwrap());
        // Sticky once observed.
        assert!(probe.should_stop().unwrap());
        assert!(probe.check().unwrap_err().is_cancelled());
    }
}
