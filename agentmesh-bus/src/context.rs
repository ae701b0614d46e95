//! Per-process session state (spec ยง9: "session id, last-active
//! timestamp, and pool path are best modeled as a per-process `Context`
//! struct threaded through the components, not a global").

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use agentmesh_store::PoolStore;

use crate::config::BusConfig;
use crate::error::BusResult;
use crate::identity;

/// Everything a running agent process needs to call into the bus: the
/// open store handle, its claimed id (mutable across `rename`), and
/// the atomics the receive loop's cancellation-by-activity channel
/// reads.
pub struct Context {
    pub pool: Arc<PoolStore>,
    pub config: BusConfig,
    pub pid: i64,
    pub hostname: String,
    id: RwLock<String>,
    /// Nanosecond timestamp of the most recent `Bridge` call in this
    /// session, bumped by every method including `recv` itself at
    /// entry. `recv`'s poll loop compares a captured snapshot of this
    /// against its current value to detect supersession (spec ยง4.F
    /// step 6).
    last_active_nanos: AtomicI64,
    /// Serializes `rename` against the heartbeat tick so a write in
    /// flight can't resurrect the old row after an id move (spec ยง4.B).
    identity_mutex: tokio::sync::Mutex<()>,
}

impl Context {
    /// Opens the Pool Store under `root`, claims an id, and performs
    /// the first heartbeat write. `cwd` is read once at construction
    /// and refreshed by every subsequent heartbeat tick.
    pub fn new(root: &Path, config: BusConfig) -> BusResult<Self> {
        let pool = Arc::new(PoolStore::open(root)?);
        let pid = std::process::id() as i64;
        let hostname = hostname();
        let cwd = current_cwd();

        let id = identity::claim(&pool, &config, pid, &hostname, &cwd)?;
        identity::heartbeat(&pool, &id, &cwd)?;

        Ok(Self {
            pool,
            config,
            pid,
            hostname,
            id: RwLock::new(id),
            last_active_nanos: AtomicI64::new(now_nanos()),
            identity_mutex: tokio::sync::Mutex::new(()),
        })
    }

    #[doc(hidden)]
    pub fn new_in_memory(config: BusConfig) -> BusResult<Self> {
        let pool = Arc::new(PoolStore::open_in_memory()?);
        let pid = std::process::id() as i64;
        let hostname = hostname();
        let cwd = current_cwd();

        let id = identity::claim(&pool, &config, pid, &hostname, &cwd)?;
        identity::heartbeat(&pool, &id, &cwd)?;

        Ok(Self {
            pool,
            config,
            pid,
            hostname,
            id: RwLock::new(id),
            last_active_nanos: AtomicI64::new(now_nanos()),
            identity_mutex: tokio::sync::Mutex::new(()),
        })
    }

    pub fn id(&self) -> String {
        self.id.read().clone()
    }

    pub(crate) fn set_id(&self, new_id: String) {
        *self.id.write() = new_id;
    }

    pub(crate) fn identity_mutex(&self) -> &tokio::sync::Mutex<()> {
        &self.identity_mutex
    }

    /// Marks this session as active right now; every `Bridge` method
    /// calls this at entry (spec ยง4.F step 6 / ยง9 "mark_active").
    pub fn mark_active(&self) {
        self.last_active_nanos.store(now_nanos(), Ordering::SeqCst);
    }

    pub fn last_active_snapshot(&self) -> i64 {
        self.last_active_nanos.load(Ordering::SeqCst)
    }

    /// Best-effort removal of this session's own agent row (spec ยง4.B
    /// "Shutdown"). Never panics; callers invoke this from a `Drop`
    /// impl or an explicit shutdown hook, neither of which can handle
    /// a propagated error usefully.
    pub fn shutdown(&self) {
        if let Err(err) = self.pool.delete_agent(&self.id()) {
            tracing::warn!(error = %err, "failed to remove agent row on shutdown");
        }
    }
}

pub(crate) fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn now_nanos() -> i64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| chrono::Utc::now().timestamp() * 1_000_000_000)
}

#[cfg(unix)]
pub(crate) fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|s| s.into_string().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown-host".to_string())
}

#[cfg(not(unix))]
pub(crate) fn hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown-host".to_string())
}

pub(crate) fn current_cwd() -> String {
    std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "unknown-cwd".to_string())
}
