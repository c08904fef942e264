//! Unified error type for the dedup core
//!
//! Categorized kinds matching the engine's failure taxonomy. Errors
//! bubble to the nearest worker boundary, which records them on the job
//! row; only `Cancelled` is swallowed there (the row is already
//! cancelled).

use std::fmt;
use thiserror::Error;

use docdedupe_storage::StorageError;

/// Error kind categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed config, weights not summing to 100, out-of-range values.
    /// Reported synchronously, never retried.
    Validation,
    /// Addressing a missing job/group/document.
    NotFound,
    /// Duplicate active job, primary assignment to a non-member.
    Conflict,
    /// 429/5xx or network failure from the upstream store; retried with
    /// backoff inside the client, then counted per document.
    UpstreamTransient,
    /// 4xx other than 429; aborts the current sync.
    UpstreamPermanent,
    /// Transactional store failure; aborts the enclosing operation.
    Storage,
    /// Cancellation observed through `job.status`.
    Cancelled,
    /// Algorithm-version mismatch, signature length mismatch and other
    /// broken invariants. The run may be retried with `force = true`.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::UpstreamTransient => "upstream_transient",
            ErrorKind::UpstreamPermanent => "upstream_permanent",
            ErrorKind::Storage => "storage",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct DedupeError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl DedupeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, format!("{entity} not found: {id}"))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn upstream_transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamTransient, message)
    }

    pub fn upstream_permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamPermanent, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "job cancelled")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl From<StorageError> for DedupeError {
    fn from(err: StorageError) -> Self {
        let kind = match err.kind {
            docdedupe_storage::ErrorKind::NotFound => ErrorKind::NotFound,
            docdedupe_storage::ErrorKind::Conflict => ErrorKind::Conflict,
            _ => ErrorKind::Storage,
        };
        DedupeError::new(kind, err.message.clone()).with_source(err)
    }
}

impl From<serde_json::Error> for DedupeError {
    fn from(err: serde_json::Error) -> Self {
        DedupeError::internal(format!("JSON error: {}", err)).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, DedupeError>;
