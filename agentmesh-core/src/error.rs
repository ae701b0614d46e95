//! Canonical error type for process-local primitives.

use thiserror::Error;

/// Result type alias for `agentmesh-core` operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Structured errors for retry, PID-liveness, and id helpers.
///
/// Mirrors the canonical-struct-with-helper-methods pattern used
/// throughout the bus kernel: every variant is constructible via a
/// helper, and `is_retryable`/`category` classify it for callers that
/// need to decide whether to retry or surface.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// A retryable operation exhausted its backoff budget.
    #[error("retry budget exhausted after {attempts} attempts: {reason}")]
    RetryExhausted { attempts: u32, reason: String },

    /// PID liveness check failed for a reason other than "no such process".
    #[error("failed to check liveness of pid {pid}: {reason}")]
    PidCheckFailed { pid: i32, reason: String },

    /// Invalid input rejected before any I/O was attempted.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl CoreError {
    pub fn retry_exhausted(attempts: u32, reason: impl Into<String>) -> Self {
        Self::RetryExhausted {
            attempts,
            reason: reason.into(),
        }
    }

    pub fn pid_check_failed(pid: i32, reason: impl Into<String>) -> Self {
        Self::PidCheckFailed {
            pid,
            reason: reason.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Returns true if the caller should give up rather than retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoreError::InvalidInput { .. })
    }

    pub fn category(&self) -> &'static str {
        match self {
            CoreError::RetryExhausted { .. } => "retry",
            CoreError::PidCheckFailed { .. } => "pid",
            CoreError::InvalidInput { .. } => "validation",
        }
    }
}
