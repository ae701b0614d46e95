//! Canonical error type for the coordination kernel.
//!
//! Follows the same pattern as `agentmesh_core::CoreError` and
//! `agentmesh_store::StoreError`: a `thiserror`-derived enum with
//! `From` conversions chaining upward, plus `is_retryable`/`category`
//! helpers. `bridge::map_error` is the only place this type is ever
//! turned into the short stable strings the external surface promises
//! (spec ยง7).

use thiserror::Error;

use agentmesh_core::CoreError;
use agentmesh_store::StoreError;

/// Result type alias for `agentmesh-bus` operations.
pub type BusResult<T> = Result<T, BusError>;

#[derive(Error, Debug)]
pub enum BusError {
    /// Propagated from the Pool Store (sqlite failure, retry exhaustion,
    /// unwritable root).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Propagated from a process-local primitive (PID check, retry policy).
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// `IdentityService::claim` exhausted its candidate budget (spec ยง4.B).
    #[error("ID pool exhausted")]
    PoolExhausted,

    /// `rename` target failed validation (spec ยง4.B: alphanumeric plus `-`/`_`).
    #[error("invalid name: {reason}")]
    InvalidName { reason: String },

    /// `rename` target is reserved (`janitor`, `leader`).
    #[error("name '{0}' is reserved")]
    ReservedName(String),

    /// `rename` target is already held by a fresh (non-stale) session.
    #[error("name '{0}' is taken")]
    NameTaken(String),

    /// `send` listed the caller among the recipients.
    #[error("cannot send to self")]
    SendToSelf,

    /// `send` named a recipient that isn't currently online.
    #[error("agent '{0}' is offline")]
    RecipientOffline(String),

    /// `send` was given `to=\"all\"` with no other agent online.
    #[error("no other agents online")]
    NoOtherAgentsOnline,
}

impl BusError {
    pub fn invalid_name(reason: impl Into<String>) -> Self {
        Self::InvalidName {
            reason: reason.into(),
        }
    }

    /// True when the underlying cause is transient store contention
    /// that a caller could plausibly retry (distinct from validation
    /// or "offline" outcomes, which are terminal for this call).
    pub fn is_retryable(&self) -> bool {
        match self {
            BusError::Store(e) => e.is_retryable(),
            BusError::Core(_) => false,
            _ => false,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            BusError::Store(_) => "store",
            BusError::Core(_) => "core",
            BusError::PoolExhausted => "exhausted",
            BusError::InvalidName { .. } => "validation",
            BusError::ReservedName(_) => "validation",
            BusError::NameTaken(_) => "validation",
            BusError::SendToSelf => "validation",
            BusError::RecipientOffline(_) => "validation",
            BusError::NoOtherAgentsOnline => "validation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_offline_display_matches_wire_contract() {
        let err = BusError::RecipientOffline("999".to_string());
        assert_eq!(err.to_string(), "agent '999' is offline");
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(BusError::PoolExhausted.category(), "exhausted");
        assert_eq!(BusError::SendToSelf.category(), "validation");
    }
}
