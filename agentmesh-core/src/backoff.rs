//! Exponential backoff with jitter for transient storage contention.
//!
//! Every Pool Store primitive that can hit `SQLITE_BUSY`/`SQLITE_LOCKED`
//! wraps its attempt with [`BackoffPolicy::retry`]. The policy itself
//! knows nothing about SQLite, callers decide what counts as
//! retryable via the predicate they pass in.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::CoreError;

/// Default policy: 30ms initial delay, 350ms cap, 7 attempts.
///
/// These numbers come from spec §4.A verbatim.
pub const DEFAULT_BACKOFF: BackoffPolicy = BackoffPolicy {
    initial: Duration::from_millis(30),
    cap: Duration::from_millis(350),
    max_attempts: 7,
};

/// An exponential-backoff-with-jitter retry policy.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub const fn new(initial: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            cap,
            max_attempts,
        }
    }

    /// Delay before the `attempt`-th retry (0-indexed), with full jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.initial.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let bounded = exp.min(self.cap);
        let jittered_millis = rand::thread_rng().gen_range(0..=bounded.as_millis().max(1) as u64);
        Duration::from_millis(jittered_millis)
    }

    /// Retry `op` up to `max_attempts` times, calling `is_retryable` to
    /// decide whether a failure should be retried at all. Surfaces
    /// [`CoreError::RetryExhausted`] if the budget runs out, or the
    /// last non-retryable error unchanged (as `Err(E)` via the
    /// returned `Result<T, E>` collapsed into a string (callers that
    /// need the original error type should inspect it before it is
    /// dropped; this helper is used where the final error is always
    /// converted to a store-level error anyway).
    pub async fn retry<T, E, F, Fut>(
        &self,
        mut op: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_reason = String::new();
        for attempt in 0..self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    last_reason = err.to_string();
                    if !is_retryable(&err) {
                        return Err(CoreError::retry_exhausted(attempt + 1, last_reason));
                    }
                    if attempt + 1 < self.max_attempts {
                        tokio_sleep_or_std(self.delay_for(attempt)).await;
                    }
                }
            }
        }
        Err(CoreError::retry_exhausted(self.max_attempts, last_reason))
    }
}

/// Sleeps on the tokio reactor when one is running, otherwise blocks
/// the current thread. The Pool Store is opened from both async
/// (`agentmesh-bus`) and plain sync test harnesses, so this helper
/// keeps `BackoffPolicy` usable from either.
async fn tokio_sleep_or_std(d: Duration) {
    if tokio::runtime::Handle::try_current().is_ok() {
        tokio::time::sleep(d).await;
    } else {
        std::thread::sleep(d);
    }
}

impl BackoffPolicy {
    /// Synchronous counterpart to [`BackoffPolicy::retry`] for callers
    /// that never have a tokio reactor nearby, like the Pool Store's
    /// blocking `rusqlite` calls. Blocks the calling thread between
    /// attempts.
    pub fn retry_blocking<T, E>(
        &self,
        mut op: impl FnMut() -> Result<T, E>,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, CoreError>
    where
        E: std::fmt::Display,
    {
        let mut last_reason = String::new();
        for attempt in 0..self.max_attempts {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    last_reason = err.to_string();
                    if !is_retryable(&err) {
                        return Err(CoreError::retry_exhausted(attempt + 1, last_reason));
                    }
                    if attempt + 1 < self.max_attempts {
                        let delay = self.delay_for(attempt);
                        tracing::debug!(attempt = attempt + 1, ?delay, reason = %last_reason, "retrying after transient error");
                        std::thread::sleep(delay);
                    }
                }
            }
        }
        Err(CoreError::retry_exhausted(self.max_attempts, last_reason))
    }
}
