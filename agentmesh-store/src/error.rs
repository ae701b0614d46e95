//! Canonical error type for Pool Store operations.

use thiserror::Error;

/// Result type alias for Pool Store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Structured errors for the Pool Store.
///
/// Follows the same canonical-struct pattern as `agentmesh_core::CoreError`:
/// every variant carries enough context to log usefully, and
/// `is_retryable`/`category` let callers decide whether to retry.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The underlying SQLite connection returned an error.
    #[error("sqlite error during {operation}: {source}")]
    Sqlite {
        operation: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The retry budget was exhausted on a busy/locked connection.
    #[error("store operation '{operation}' exhausted retries: {0}", .source)]
    RetryExhausted {
        operation: String,
        #[source]
        source: agentmesh_core::CoreError,
    },

    /// Neither the primary nor the fallback pool root was writable.
    #[error("no writable pool root found (tried {tried:?})")]
    RootUnwritable { tried: Vec<String> },

    /// A row referenced by id does not exist.
    #[error("no such {kind} with id '{id}'")]
    NotFound { kind: &'static str, id: String },

    /// Filesystem I/O failure unrelated to SQLite itself (creating the
    /// pool root, wiping stale schema files).
    #[error("I/O error during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn sqlite(operation: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Sqlite {
            operation: operation.into(),
            source,
        }
    }

    pub fn retry_exhausted(operation: impl Into<String>, source: agentmesh_core::CoreError) -> Self {
        Self::RetryExhausted {
            operation: operation.into(),
            source,
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// True for SQLite's two transient-contention error codes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite {
                source: rusqlite::Error::SqliteFailure(err, _),
                ..
            } if matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            StoreError::Sqlite { .. } => "sqlite",
            StoreError::RetryExhausted { .. } => "retry",
            StoreError::RootUnwritable { .. } => "root",
            StoreError::NotFound { .. } => "not_found",
            StoreError::Io { .. } => "io",
        }
    }
}
