//! Identity Service (spec ยง4.B): claim a 3-digit id, heartbeat, rename,
//! remove self on exit.

use rand::Rng;

use agentmesh_store::PoolStore;

use crate::config::BusConfig;
use crate::context::now_secs;
use crate::error::{BusError, BusResult};

const MAX_CANDIDATES: u32 = 5000;

/// Attempts up to [`MAX_CANDIDATES`] random 3-digit ids, claiming the
/// first one that's either unused or held by a stale (past-TTL)
/// session. Ties on a stale id are broken by `steal_stale_agent`'s
/// conditional update, so two colliding reclaimers can't both win.
pub fn claim(pool: &PoolStore, cfg: &BusConfig, pid: i64, hostname: &str, cwd: &str) -> BusResult<String> {
    let now = now_secs();
    let cutoff = now - cfg.heartbeat_ttl.as_secs() as i64;
    let mut rng = rand::thread_rng();

    for _ in 0..MAX_CANDIDATES {
        let candidate = format!("{:03}", rng.gen_range(1..=999u32));

        if pool.try_claim_agent(&candidate, pid, hostname, cwd, now)? {
            return Ok(candidate);
        }

        if pool.steal_stale_agent(&candidate, pid, hostname, cwd, now, cutoff)? {
            return Ok(candidate);
        }
    }

    Err(BusError::PoolExhausted)
}

/// Refreshes `last_seen` and `cwd` for `id`. Called once at claim time
/// and then on every tick of the background maintenance loop.
pub fn heartbeat(pool: &PoolStore, id: &str, cwd: &str) -> BusResult<()> {
    let now = now_secs();
    pool.heartbeat_agent(id, cwd, now)?;
    Ok(())
}

/// Outcome of a [`rename`] call, mapped to the spec ยง6 wire strings by
/// `bridge::rename`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    Ok,
}

/// Validates `new_name`, refuses reserved names, and moves `old_id`'s
/// row (and all messages referencing it) to `new_name` if the target
/// slot is free or held by a stale session.
///
/// Spec ยง4.B: "Reserved names... are either refused or, in the
/// 'leader inheritance' policy, allowed to replace a stale holder."
/// This implementation always refuses (ยง9 Open Question b).
pub fn rename(pool: &PoolStore, cfg: &BusConfig, old_id: &str, new_name: &str) -> BusResult<RenameOutcome> {
    validate_name(new_name)?;

    if BusConfig::is_reserved(new_name) {
        return Err(BusError::ReservedName(new_name.to_string()));
    }

    let now = now_secs();
    let cutoff = now - cfg.heartbeat_ttl.as_secs() as i64;

    if pool.rename_agent(old_id, new_name, now, cutoff)? {
        Ok(RenameOutcome::Ok)
    } else {
        Err(BusError::NameTaken(new_name.to_string()))
    }
}

fn validate_name(name: &str) -> BusResult<()> {
    if name.is_empty() {
        return Err(BusError::invalid_name("name must not be empty"));
    }
    if name.len() > 32 {
        return Err(BusError::invalid_name("name too long"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(BusError::invalid_name(
            "name must be alphanumeric plus '-' or '_'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PoolStore {
        PoolStore::open_in_memory().unwrap()
    }

    #[test]
    fn claim_returns_three_digit_id() {
        let s = store();
        let id = claim(&s, &BusConfig::default(), 1, "h", "/tmp").unwrap();
        assert_eq!(id.len(), 3);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn rename_rejects_invalid_characters() {
        let s = store();
        let cfg = BusConfig::default();
        let id = claim(&s, &cfg, 1, "h", "/tmp").unwrap();
        let err = rename(&s, &cfg, &id, "not ok!").unwrap_err();
        assert!(matches!(err, BusError::InvalidName { .. }));
    }

    #[test]
    fn rename_refuses_reserved_names() {
        let s = store();
        let cfg = BusConfig::default();
        let id = claim(&s, &cfg, 1, "h", "/tmp").unwrap();
        let err = rename(&s, &cfg, &id, "leader").unwrap_err();
        assert!(matches!(err, BusError::ReservedName(_)));
    }

    #[test]
    fn rename_succeeds_on_free_slot() {
        let s = store();
        let cfg = BusConfig::default();
        let id = claim(&s, &cfg, 1, "h", "/tmp").unwrap();
        let outcome = rename(&s, &cfg, &id, "scout").unwrap();
        assert_eq!(outcome, RenameOutcome::Ok);
        assert!(s.get_agent("scout").unwrap().is_some());
    }

    #[test]
    fn rename_rejects_fresh_taken_name() {
        let s = store();
        let cfg = BusConfig::default();
        let a = claim(&s, &cfg, 1, "h", "/tmp").unwrap();
        let _b = claim(&s, &cfg, 2, "h", "/tmp").unwrap();
        s.try_claim_agent("scout", 3, "h", "/tmp", now_secs()).unwrap();
        let err = rename(&s, &cfg, &a, "scout").unwrap_err();
        assert!(matches!(err, BusError::NameTaken(_)));
    }
}
