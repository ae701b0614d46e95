//! Presence View (spec ยง4.C): a read-only, advisory, eventually
//! consistent projection over the Pool Store's `peers` table.

use agentmesh_store::{AgentRow, PoolStore};

use crate::config::BusConfig;
use crate::context::now_secs;
use crate::error::BusResult;

/// Returns every agent whose `last_seen` is within `heartbeat_ttl` of
/// now, ordered by id.
pub fn list_online(pool: &PoolStore, cfg: &BusConfig) -> BusResult<Vec<AgentRow>> {
    let now = now_secs();
    Ok(pool.list_online_agents(now, cfg.heartbeat_ttl.as_secs() as i64)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_fresh_peers() {
        let s = PoolStore::open_in_memory().unwrap();
        let cfg = BusConfig::default();
        s.try_claim_agent("001", 1, "h", "/tmp", 0).unwrap();
        s.try_claim_agent("002", 2, "h", "/tmp", 1_000_000).unwrap();

        // Force "now" far enough past 001's heartbeat for it to be
        // stale, by directly reaping instead of waiting real time.
        s.reap_stale_agents(1_000_000 + cfg.heartbeat_ttl.as_secs() as i64 + 1, cfg.heartbeat_ttl.as_secs() as i64)
            .unwrap();

        let online = s.list_online_agents(1_000_000 + cfg.heartbeat_ttl.as_secs() as i64 + 1, cfg.heartbeat_ttl.as_secs() as i64).unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].id, "002");
    }
}
