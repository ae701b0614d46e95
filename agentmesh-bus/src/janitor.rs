//! Janitor / Leader (spec ยง4.E): single-elected maintenance role.
//!
//! One `Janitor` lives per process, owned by the maintenance task
//! spawned from `Context::spawn_maintenance`. It tracks its own
//! per-duty cadence locally (via `Instant` checkpoints) rather than in
//! any global, keeping the cadence state inside the task that owns it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use agentmesh_store::PoolStore;

use crate::config::BusConfig;
use crate::context::now_secs;
use crate::error::BusResult;

const REMOTE_REAP_EVERY: Duration = Duration::from_secs(120);
const CHECKPOINT_EVERY: Duration = Duration::from_secs(600);
const LOCAL_PID_SCAN_EVERY: Duration = Duration::from_secs(15);

/// Tracks this process's leader status and the last-run instant of
/// each maintenance duty.
pub struct Janitor {
    is_leader: AtomicBool,
    last_local_scan: parking_lot::Mutex<Instant>,
    last_remote_reap: parking_lot::Mutex<Instant>,
    last_checkpoint: parking_lot::Mutex<Instant>,
}

impl Janitor {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            is_leader: AtomicBool::new(false),
            last_local_scan: parking_lot::Mutex::new(now),
            last_remote_reap: parking_lot::Mutex::new(now),
            last_checkpoint: parking_lot::Mutex::new(now),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// One tick of the maintenance loop: attempt to (re)acquire the
    /// leader lease, and if successful, run whichever duties are due.
    pub fn tick(&self, pool: &PoolStore, cfg: &BusConfig, my_id: &str, hostname: &str, pid: i64) -> BusResult<()> {
        let now = now_secs();
        let won = pool.try_acquire_or_renew_lease(my_id, hostname, pid, now, cfg.leader_lease_ttl.as_secs() as i64)?;
        self.is_leader.store(won, Ordering::SeqCst);

        if !won {
            return Ok(());
        }

        if due(&self.last_local_scan, LOCAL_PID_SCAN_EVERY) {
            local_pid_scan(pool, hostname, my_id)?;
        }

        if due(&self.last_remote_reap, REMOTE_REAP_EVERY) {
            remote_reap(pool, cfg)?;
            prune_messages(pool, cfg)?;
        }

        if due(&self.last_checkpoint, CHECKPOINT_EVERY) {
            pool.checkpoint()?;
        }

        if cfg.deadlock_alerts_enabled {
            deadlock::check(pool, cfg)?;
        }

        Ok(())
    }
}

impl Default for Janitor {
    fn default() -> Self {
        Self::new()
    }
}

fn due(last: &parking_lot::Mutex<Instant>, interval: Duration) -> bool {
    let mut guard = last.lock();
    if guard.elapsed() >= interval {
        *guard = Instant::now();
        true
    } else {
        false
    }
}

/// Duty 1: delete local peer rows whose PID no longer exists on this
/// host. Deliberately excludes the caller's own row.
fn local_pid_scan(pool: &PoolStore, hostname: &str, my_id: &str) -> BusResult<()> {
    for (id, pid) in pool.scan_local_pids(hostname)? {
        if id == my_id {
            continue;
        }
        if !agentmesh_core::is_alive(pid as i32) {
            pool.delete_agent(&id)?;
            tracing::info!(agent_id = %id, pid, "reaped agent with dead pid");
        }
    }
    Ok(())
}

/// Duty 2: TTL-based reap of stale peers (any host), clearing stale
/// waiting flags and recovering expired message leases.
fn remote_reap(pool: &PoolStore, cfg: &BusConfig) -> BusResult<()> {
    let now = now_secs();
    let reaped = pool.reap_stale_agents(now, cfg.heartbeat_ttl.as_secs() as i64)?;
    if reaped > 0 {
        tracing::info!(count = reaped, "reaped stale agents");
    }
    pool.clear_stale_waiting(now)?;
    let recovered = pool.recover_expired_leases(now)?;
    if recovered > 0 {
        tracing::info!(count = recovered, "recovered expired message leases");
    }
    Ok(())
}

/// Duty 3: delete messages older than `msg_ttl`.
fn prune_messages(pool: &PoolStore, cfg: &BusConfig) -> BusResult<()> {
    let now = now_secs();
    let pruned = pool.prune_expired_messages(now, cfg.msg_ttl.as_secs() as i64)?;
    if pruned > 0 {
        tracing::info!(count = pruned, "pruned expired messages");
    }
    Ok(())
}

/// Duty 5: deadlock detection (spec ยง4.E duty 5 / ยง4.G).
pub mod deadlock {
    use agentmesh_store::{AgentMode, NewMessage, PoolStore};

    use crate::config::BusConfig;
    use crate::context::now_secs;
    use crate::error::BusResult;
    use crate::presence;

    /// `from_user` stamped on the system-authored deadlock warning.
    pub const ALERT_SENDER: &str = "janitor";

    pub fn check(pool: &PoolStore, cfg: &BusConfig) -> BusResult<()> {
        let online = presence::list_online(pool, cfg)?;

        if online.is_empty() || !online.iter().all(|a| a.mode == AgentMode::Waiting) {
            pool.deadlock_reset()?;
            return Ok(());
        }

        let now = now_secs();
        let snapshot = pool.deadlock_snapshot()?;

        let first_detected = match snapshot.first_detected_at {
            Some(t) => t,
            None => {
                pool.deadlock_mark_first_detected(now)?;
                return Ok(());
            }
        };

        if now - first_detected < cfg.deadlock_trigger_delay.as_secs() as i64 {
            return Ok(());
        }

        if let Some(last_warned) = snapshot.last_warned_at {
            if now - last_warned < cfg.deadlock_warning_cooldown.as_secs() as i64 {
                return Ok(());
            }
        }

        let leaders: Vec<&str> = online
            .iter()
            .map(|a| a.id.as_str())
            .filter(|id| id.to_lowercase().contains("leader"))
            .collect();

        if leaders.is_empty() {
            tracing::warn!("all agents deadlocked waiting, but no 'leader'-named agent to notify");
            pool.deadlock_mark_warned(now)?;
            return Ok(());
        }

        let ts_str = chrono::Utc::now().format("%H:%M:%S").to_string();
        let content = "All agents are currently waiting on recv(). Nobody is assigning work.".to_string();
        let rows: Vec<NewMessage> = leaders
            .into_iter()
            .map(|to_id| NewMessage {
                msg_id: agentmesh_core::new_msg_id(),
                ts: now,
                ts_str: ts_str.clone(),
                from_user: ALERT_SENDER.to_string(),
                to_user: to_id.to_string(),
                content: content.clone(),
            })
            .collect();
        pool.enqueue_messages(&rows)?;
        pool.deadlock_mark_warned(now)?;
        tracing::warn!("deadlock alert delivered to leader-named agent(s)");

        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_of_two_wins_the_lease() {
        let s = PoolStore::open_in_memory().unwrap();
        let cfg = BusConfig::default();
        let a = Janitor::new();
        let b = Janitor::new();

        a.tick(&s, &cfg, "001", "h", 1).unwrap();
        b.tick(&s, &cfg, "002", "h", 2).unwrap();

        assert!(a.is_leader());
        assert!(!b.is_leader());
    }

    #[test]
    fn local_scan_reaps_dead_pid_but_not_self() {
        let s = PoolStore::open_in_memory().unwrap();
        s.try_claim_agent("001", std::process::id() as i64, "h", "/tmp", 0).unwrap();
        s.try_claim_agent("002", 999_999_999, "h", "/tmp", 0).unwrap();

        local_pid_scan(&s, "h", "001").unwrap();

        assert!(s.get_agent("001").unwrap().is_some());
        assert!(s.get_agent("002").unwrap().is_none());
    }
}
