//! Failure reporting for the store
//!
//! Every fallible store operation returns [`StorageError`]: one flat
//! error type whose [`ErrorKind`] tells callers how to react. The
//! engine surfaces `NotFound` and `Conflict` to its own taxonomy and
//! treats everything else as fatal storage trouble, so the kind set
//! stays deliberately small.

use std::fmt;
use thiserror::Error;

/// How a store operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The addressed row does not exist.
    NotFound,
    /// A state rule was violated: a second active job of the same kind,
    /// a primary assigned to a non-member, a start on a non-pending job.
    Conflict,
    /// SQLite reported a failure (I/O, constraint, busy timeout).
    Database,
    /// A stored value could not be encoded or decoded.
    Serialization,
}

impl ErrorKind {
    /// Lowercase label; stable, appears in messages and log lines.
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Database => "database",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned by every store operation.
#[derive(Debug, Error)]
#[error("{message} ({kind})")]
pub struct StorageError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StorageError {
    fn fresh(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
            source: None,
        }
    }

    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::fresh(ErrorKind::NotFound, format!("no such {entity}: {id}"))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::fresh(ErrorKind::Conflict, message.into())
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::fresh(ErrorKind::Database, message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::fresh(ErrorKind::Serialization, message.into())
    }

    /// Attach the underlying error so `source()` chains stay intact.
    pub fn caused_by(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        let message = format!("database failure: {err}");
        Self {
            kind: ErrorKind::Database,
            message,
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        let message = format!("malformed JSON payload: {err}");
        Self {
            kind: ErrorKind::Serialization,
            message,
            source: Some(Box::new(err)),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StorageError>;
