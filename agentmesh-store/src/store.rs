//! `PoolStore`: the CAS primitives every higher layer is built from
//! (spec §4.A–§4.E combined). Each primitive is one SQL statement or
//! one short transaction; none of them know anything about agents,
//! leases as a concept, or leadership; they only know rows.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};

use agentmesh_core::backoff::DEFAULT_BACKOFF;

use crate::connection::Handle;
use crate::error::{StoreError, StoreResult};
use crate::models::{AgentMode, AgentRow, DeadlockState, LeaderLease, MessageRow, MessageState};

/// A message not yet assigned a state, as handed to [`PoolStore::enqueue_messages`].
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub msg_id: String,
    pub ts: i64,
    pub ts_str: String,
    pub from_user: String,
    pub to_user: String,
    pub content: String,
}

/// The result of [`PoolStore::select_and_lease_batch`]: the messages
/// leased to the caller plus how many queued rows were left behind by
/// the batch-size cap (spec §4.D "bounded batches").
#[derive(Debug, Clone, Default)]
pub struct LeaseBatch {
    pub messages: Vec<MessageRow>,
    pub more_available: bool,
    pub remaining: usize,
}

pub struct PoolStore {
    handle: Handle,
}

impl PoolStore {
    pub fn open(root: &Path) -> StoreResult<Self> {
        Ok(Self {
            handle: Handle::open(root)?,
        })
    }

    #[doc(hidden)]
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            handle: Handle::open_in_memory()?,
        })
    }

    /// Runs `f` against the connection, retrying `SQLITE_BUSY`/`SQLITE_LOCKED`
    /// with [`DEFAULT_BACKOFF`]. Every primitive below goes through this.
    fn run<T>(
        &self,
        operation: &str,
        mut f: impl FnMut(&mut Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        tracing::debug!(operation, "pool store primitive");
        DEFAULT_BACKOFF
            .retry_blocking(|| self.handle.with_conn(|conn| f(conn)), is_retryable_rusqlite)
            .map_err(|core_err| StoreError::retry_exhausted(operation, core_err))
    }

    // ---- Identity / presence (§4.B, §4.C) -------------------------------

    pub fn try_claim_agent(&self, id: &str, pid: i64, hostname: &str, cwd: &str, now: i64) -> StoreResult<bool> {
        self.run("try_claim_agent", |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO peers
                    (id, pid, hostname, cwd, last_seen, mode, mode_since)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'working', ?5)",
                params![id, pid, hostname, cwd, now],
            )?;
            Ok(changed == 1)
        })
    }

    /// Conditional replace: only succeeds if the existing row's
    /// `last_seen` is still below `cutoff` at write time, so two
    /// colliding reclaimers can't both win (spec §4.B).
    pub fn steal_stale_agent(
        &self,
        id: &str,
        pid: i64,
        hostname: &str,
        cwd: &str,
        now: i64,
        cutoff: i64,
    ) -> StoreResult<bool> {
        self.run("steal_stale_agent", |conn| {
            let changed = conn.execute(
                "UPDATE peers
                    SET pid = ?2, hostname = ?3, cwd = ?4, last_seen = ?5,
                        mode = 'working', mode_since = ?5,
                        recv_started = NULL, recv_deadline = NULL,
                        recv_wait_seconds = NULL, recv_last_touch = NULL
                  WHERE id = ?1 AND last_seen < ?6",
                params![id, pid, hostname, cwd, now, cutoff],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn heartbeat_agent(&self, id: &str, cwd: &str, now: i64) -> StoreResult<bool> {
        self.run("heartbeat_agent", |conn| {
            let changed = conn.execute(
                "UPDATE peers SET last_seen = ?2, cwd = ?3 WHERE id = ?1",
                params![id, now, cwd],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn delete_agent(&self, id: &str) -> StoreResult<()> {
        self.run("delete_agent", |conn| {
            conn.execute("DELETE FROM peers WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    pub fn get_agent(&self, id: &str) -> StoreResult<Option<AgentRow>> {
        self.run("get_agent", |conn| {
            conn.query_row("SELECT * FROM peers WHERE id = ?1", params![id], row_to_agent)
                .optional()
        })
    }

    /// Atomically moves `old_id`'s row to `new_id`. `cutoff` is the
    /// heartbeat staleness boundary the caller (Identity Service)
    /// computed from its configured `HEARTBEAT_TTL`; a row already
    /// sitting at `new_id` is only evicted if its `last_seen` is below
    /// it. Returns `false` (without error) when blocked by a fresh
    /// occupant; the caller maps that to `"Name taken"`.
    pub fn rename_agent(&self, old_id: &str, new_id: &str, now: i64, cutoff: i64) -> StoreResult<bool> {
        self.run("rename_agent", |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM peers WHERE id = ?1 AND last_seen < ?2",
                params![new_id, cutoff],
            )?;
            let moved = tx.execute(
                "UPDATE peers SET id = ?2
                  WHERE id = ?1
                    AND NOT EXISTS (SELECT 1 FROM peers WHERE id = ?2)",
                params![old_id, new_id],
            )?;
            if moved == 1 {
                tx.execute(
                    "UPDATE messages SET to_user = ?2 WHERE to_user = ?1",
                    params![old_id, new_id],
                )?;
                tx.execute(
                    "UPDATE messages SET from_user = ?2 WHERE from_user = ?1",
                    params![old_id, new_id],
                )?;
            }
            tx.commit()?;
            Ok(moved == 1)
        })
    }

    pub fn list_online_agents(&self, now: i64, heartbeat_ttl_secs: i64) -> StoreResult<Vec<AgentRow>> {
        self.run("list_online_agents", |conn| {
            let cutoff = now - heartbeat_ttl_secs;
            let mut stmt = conn.prepare("SELECT * FROM peers WHERE last_seen >= ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![cutoff], row_to_agent)?;
            rows.collect()
        })
    }

    /// Marks an agent waiting in `recv` (spec §4.F step 1).
    pub fn set_waiting(&self, id: &str, now: i64, wait_seconds: i64) -> StoreResult<()> {
        self.run("set_waiting", |conn| {
            conn.execute(
                "UPDATE peers
                    SET mode = 'waiting', mode_since = ?2,
                        recv_started = ?2, recv_deadline = ?3,
                        recv_wait_seconds = ?4, recv_last_touch = ?2
                  WHERE id = ?1",
                params![id, now, now + wait_seconds, wait_seconds],
            )?;
            Ok(())
        })
    }

    pub fn touch_recv(&self, id: &str, now: i64) -> StoreResult<()> {
        self.run("touch_recv", |conn| {
            conn.execute("UPDATE peers SET recv_last_touch = ?2 WHERE id = ?1", params![id, now])?;
            Ok(())
        })
    }

    pub fn clear_waiting(&self, id: &str, now: i64) -> StoreResult<()> {
        self.run("clear_waiting", |conn| {
            conn.execute(
                "UPDATE peers
                    SET mode = 'working', mode_since = ?2,
                        recv_started = NULL, recv_deadline = NULL,
                        recv_wait_seconds = NULL, recv_last_touch = NULL
                  WHERE id = ?1",
                params![id, now],
            )?;
            Ok(())
        })
    }

    // ---- Leader lease (§4.E) --------------------------------------------

    /// Conditional upsert: wins if nobody holds the lease, the caller
    /// already holds it (renew), or the holder's lease has expired.
    pub fn try_acquire_or_renew_lease(
        &self,
        owner_id: &str,
        host: &str,
        pid: i64,
        now: i64,
        lease_ttl_secs: i64,
    ) -> StoreResult<bool> {
        self.run("try_acquire_or_renew_lease", |conn| {
            let changed = conn.execute(
                "INSERT INTO leader_lease (key, owner_id, host, pid, lease_until, updated_at)
                 VALUES ('main', ?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key) DO UPDATE SET
                    owner_id = excluded.owner_id,
                    host = excluded.host,
                    pid = excluded.pid,
                    lease_until = excluded.lease_until,
                    updated_at = excluded.updated_at
                 WHERE leader_lease.owner_id = excluded.owner_id
                    OR leader_lease.lease_until < ?6",
                params![owner_id, host, pid, now + lease_ttl_secs, now, now],
            )?;
            Ok(changed == 1)
        })
    }

    /// Reads the current lease row, regardless of whether it is still
    /// live, so callers can decide what "expired" means for their
    /// purpose (status display vs. re-election).
    pub fn get_lease(&self) -> StoreResult<Option<LeaderLease>> {
        self.run("get_lease", |conn| {
            conn.query_row("SELECT * FROM leader_lease WHERE key = 'main'", [], row_to_lease)
                .optional()
        })
    }

    // ---- Messages (§4.D) -------------------------------------------------

    pub fn enqueue_messages(&self, messages: &[NewMessage]) -> StoreResult<()> {
        self.run("enqueue_messages", |conn| {
            let tx = conn.transaction()?;
            for m in messages {
                tx.execute(
                    "INSERT INTO messages
                        (msg_id, ts, ts_str, from_user, to_user, content, state, attempt)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'queued', 0)",
                    params![m.msg_id, m.ts, m.ts_str, m.from_user, m.to_user, m.content],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Resets any `inflight` message whose lease has expired back to
    /// `queued` (spec §4.D "crash-safe handoff"). Returns the count
    /// recovered.
    pub fn recover_expired_leases(&self, now: i64) -> StoreResult<usize> {
        self.run("recover_expired_leases", |conn| {
            conn.execute(
                "UPDATE messages
                    SET state = 'queued', lease_owner = NULL, lease_until = NULL
                  WHERE state = 'inflight' AND lease_until < ?1",
                params![now],
            )
        })
    }

    /// Selects queued messages for `to_id`, in `ts` order, accumulating
    /// up to `max_batch_chars` bytes using `len(content) + 60` per row
    /// as the estimate (spec §4.D/§5) and scanning at most
    /// `scan_cap` candidate rows. Always includes at least one message
    /// even if it alone exceeds the budget. The selected rows are
    /// leased to `to_id` atomically in the same transaction.
    pub fn select_and_lease_batch(
        &self,
        to_id: &str,
        now: i64,
        lease_ttl_secs: i64,
        max_batch_chars: usize,
        scan_cap: usize,
    ) -> StoreResult<LeaseBatch> {
        self.run("select_and_lease_batch", |conn| {
            let tx = conn.transaction()?;
            let candidates: Vec<MessageRow> = {
                let mut stmt = tx.prepare(
                    "SELECT * FROM messages
                      WHERE to_user = ?1 AND state = 'queued'
                      ORDER BY ts ASC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![to_id, scan_cap as i64], row_to_message)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let mut selected = Vec::new();
            let mut budget = 0usize;
            for row in candidates.iter() {
                let estimate = row.content.len() + 60;
                if !selected.is_empty() && budget + estimate > max_batch_chars {
                    break;
                }
                budget += estimate;
                selected.push(row.clone());
            }
            let total_queued: i64 = tx.query_row(
                "SELECT COUNT(*) FROM messages WHERE to_user = ?1 AND state = 'queued'",
                params![to_id],
                |row| row.get(0),
            )?;
            let remaining = (total_queued as usize).saturating_sub(selected.len());
            let more_available = remaining > 0;

            if !selected.is_empty() {
                let placeholders = selected.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!(
                    "UPDATE messages
                        SET state = 'inflight', lease_owner = ?, lease_until = ?,
                            attempt = attempt + 1, delivered_at = ?
                      WHERE state = 'queued' AND msg_id IN ({placeholders})"
                );
                let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> =
                    vec![Box::new(to_id.to_string()), Box::new(now + lease_ttl_secs), Box::new(now)];
                for row in &selected {
                    params_vec.push(Box::new(row.msg_id.clone()));
                }
                let param_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
                tx.execute(&sql, param_refs.as_slice())?;
            }
            tx.commit()?;

            for row in &mut selected {
                row.state = MessageState::Inflight;
                row.lease_owner = Some(to_id.to_string());
                row.lease_until = Some(now + lease_ttl_secs);
                row.attempt += 1;
                row.delivered_at = Some(now);
            }

            Ok(LeaseBatch {
                messages: selected,
                more_available,
                remaining,
            })
        })
    }

    pub fn ack_messages(&self, owner_id: &str, msg_ids: &[String]) -> StoreResult<usize> {
        if msg_ids.is_empty() {
            return Ok(0);
        }
        self.run("ack_messages", |conn| {
            let placeholders = msg_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "DELETE FROM messages
                  WHERE lease_owner = ? AND state = 'inflight' AND msg_id IN ({placeholders})"
            );
            let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&owner_id];
            params_vec.extend(msg_ids.iter().map(|id| id as &dyn rusqlite::ToSql));
            conn.execute(&sql, params_vec.as_slice())
        })
    }

    pub fn release_messages(&self, owner_id: &str, msg_ids: &[String]) -> StoreResult<usize> {
        if msg_ids.is_empty() {
            return Ok(0);
        }
        self.run("release_messages", |conn| {
            let placeholders = msg_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "UPDATE messages SET state = 'queued', lease_owner = NULL, lease_until = NULL
                  WHERE lease_owner = ? AND state = 'inflight' AND msg_id IN ({placeholders})"
            );
            let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&owner_id];
            params_vec.extend(msg_ids.iter().map(|id| id as &dyn rusqlite::ToSql));
            conn.execute(&sql, params_vec.as_slice())
        })
    }

    // ---- Janitor duties (§4.E) -------------------------------------------

    pub fn reap_stale_agents(&self, now: i64, heartbeat_ttl_secs: i64) -> StoreResult<usize> {
        self.run("reap_stale_agents", |conn| {
            conn.execute(
                "DELETE FROM peers WHERE last_seen < ?1",
                params![now - heartbeat_ttl_secs],
            )
        })
    }

    pub fn clear_stale_waiting(&self, now: i64) -> StoreResult<usize> {
        self.run("clear_stale_waiting", |conn| {
            conn.execute(
                "UPDATE peers
                    SET mode = 'working', mode_since = ?1,
                        recv_started = NULL, recv_deadline = NULL,
                        recv_wait_seconds = NULL, recv_last_touch = NULL
                  WHERE mode = 'waiting' AND recv_deadline IS NOT NULL AND recv_deadline < ?1",
                params![now],
            )
        })
    }

    pub fn prune_expired_messages(&self, now: i64, msg_ttl_secs: i64) -> StoreResult<usize> {
        self.run("prune_expired_messages", |conn| {
            conn.execute("DELETE FROM messages WHERE ts < ?1", params![now - msg_ttl_secs])
        })
    }

    pub fn scan_local_pids(&self, hostname: &str) -> StoreResult<Vec<(String, i64)>> {
        self.run("scan_local_pids", |conn| {
            let mut stmt = conn.prepare("SELECT id, pid FROM peers WHERE hostname = ?1")?;
            let rows = stmt.query_map(params![hostname], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
    }

    pub fn checkpoint(&self) -> StoreResult<()> {
        self.run("checkpoint", |conn| {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        })
    }

    // ---- Deadlock alert state (§4.E duty 5, §4.G) ------------------------

    pub fn deadlock_snapshot(&self) -> StoreResult<DeadlockState> {
        self.run("deadlock_snapshot", |conn| {
            conn.query_row(
                "SELECT first_detected_at, last_warned_at FROM deadlock_state WHERE key = 'main'",
                [],
                |row| {
                    Ok(DeadlockState {
                        first_detected_at: row.get(0)?,
                        last_warned_at: row.get(1)?,
                    })
                },
            )
            .optional()
            .map(|o| o.unwrap_or_default())
        })
    }

    /// Records the first instant every online peer was observed
    /// waiting, if one isn't already recorded.
    pub fn deadlock_mark_first_detected(&self, now: i64) -> StoreResult<()> {
        self.run("deadlock_mark_first_detected", |conn| {
            conn.execute(
                "INSERT INTO deadlock_state (key, first_detected_at, last_warned_at)
                 VALUES ('main', ?1, NULL)
                 ON CONFLICT(key) DO UPDATE SET
                    first_detected_at = COALESCE(deadlock_state.first_detected_at, ?1)",
                params![now],
            )?;
            Ok(())
        })
    }

    pub fn deadlock_mark_warned(&self, now: i64) -> StoreResult<()> {
        self.run("deadlock_mark_warned", |conn| {
            conn.execute(
                "INSERT INTO deadlock_state (key, first_detected_at, last_warned_at)
                 VALUES ('main', ?1, ?1)
                 ON CONFLICT(key) DO UPDATE SET last_warned_at = ?1",
                params![now],
            )?;
            Ok(())
        })
    }

    /// Clears the "everyone waiting" window once at least one peer is
    /// no longer waiting.
    pub fn deadlock_reset(&self) -> StoreResult<()> {
        self.run("deadlock_reset", |conn| {
            conn.execute("DELETE FROM deadlock_state WHERE key = 'main'", [])?;
            Ok(())
        })
    }
}

fn is_retryable_rusqlite(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

fn row_to_agent(row: &Row) -> rusqlite::Result<AgentRow> {
    Ok(AgentRow {
        id: row.get("id")?,
        pid: row.get("pid")?,
        hostname: row.get("hostname")?,
        cwd: row.get("cwd")?,
        last_seen: row.get("last_seen")?,
        mode: AgentMode::parse(&row.get::<_, String>("mode")?),
        mode_since: row.get("mode_since")?,
        recv_started: row.get("recv_started")?,
        recv_deadline: row.get("recv_deadline")?,
        recv_wait_seconds: row.get("recv_wait_seconds")?,
        recv_last_touch: row.get("recv_last_touch")?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        msg_id: row.get("msg_id")?,
        ts: row.get("ts")?,
        ts_str: row.get("ts_str")?,
        from_user: row.get("from_user")?,
        to_user: row.get("to_user")?,
        content: row.get("content")?,
        state: MessageState::parse(&row.get::<_, String>("state")?),
        lease_owner: row.get("lease_owner")?,
        lease_until: row.get("lease_until")?,
        attempt: row.get("attempt")?,
        delivered_at: row.get("delivered_at")?,
    })
}

fn row_to_lease(row: &Row) -> rusqlite::Result<LeaderLease> {
    Ok(LeaderLease {
        owner_id: row.get("owner_id")?,
        host: row.get("host")?,
        pid: row.get("pid")?,
        lease_until: row.get("lease_until")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PoolStore {
        PoolStore::open_in_memory().unwrap()
    }

    #[test]
    fn claim_is_exclusive() {
        let s = store();
        assert!(s.try_claim_agent("042", 1, "host", "/tmp", 100).unwrap());
        assert!(!s.try_claim_agent("042", 2, "host", "/tmp", 100).unwrap());
    }

    #[test]
    fn steal_only_succeeds_when_stale() {
        let s = store();
        s.try_claim_agent("042", 1, "host", "/tmp", 100).unwrap();
        assert!(!s.steal_stale_agent("042", 2, "host", "/tmp", 500, 100).unwrap());
        assert!(s.steal_stale_agent("042", 2, "host", "/tmp", 500, 400).unwrap());
        let row = s.get_agent("042").unwrap().unwrap();
        assert_eq!(row.pid, 2);
    }

    #[test]
    fn heartbeat_updates_last_seen() {
        let s = store();
        s.try_claim_agent("042", 1, "host", "/tmp", 100).unwrap();
        assert!(s.heartbeat_agent("042", "/home", 200).unwrap());
        let row = s.get_agent("042").unwrap().unwrap();
        assert_eq!(row.last_seen, 200);
        assert_eq!(row.cwd, "/home");
    }

    #[test]
    fn rename_moves_row_and_messages() {
        let s = store();
        s.try_claim_agent("042", 1, "host", "/tmp", 100).unwrap();
        s.enqueue_messages(&[NewMessage {
            msg_id: "m1".into(),
            ts: 100,
            ts_str: "t".into(),
            from_user: "007".into(),
            to_user: "042".into(),
            content: "hi".into(),
        }])
        .unwrap();

        assert!(s.rename_agent("042", "jett", 100, 0).unwrap());
        assert!(s.get_agent("042").unwrap().is_none());
        assert!(s.get_agent("jett").unwrap().is_some());

        let batch = s.select_and_lease_batch("jett", 200, 30, 4000, 200).unwrap();
        assert_eq!(batch.messages.len(), 1);
    }

    #[test]
    fn rename_blocked_by_fresh_target() {
        let s = store();
        s.try_claim_agent("042", 1, "host", "/tmp", 100).unwrap();
        s.try_claim_agent("jett", 2, "host", "/tmp", 100).unwrap();
        assert!(!s.rename_agent("042", "jett", 200, 0).unwrap());
    }

    #[test]
    fn lease_acquisition_is_exclusive_until_expiry() {
        let s = store();
        assert!(s.try_acquire_or_renew_lease("042", "host", 1, 100, 45).unwrap());
        assert!(!s.try_acquire_or_renew_lease("007", "host", 2, 110, 45).unwrap());
        assert!(s.try_acquire_or_renew_lease("042", "host", 1, 120, 45).unwrap());
        assert!(s.try_acquire_or_renew_lease("007", "host", 2, 200, 45).unwrap());
    }

    #[test]
    fn get_lease_reflects_the_current_holder() {
        let s = store();
        assert!(s.get_lease().unwrap().is_none());

        s.try_acquire_or_renew_lease("042", "host", 1, 100, 45).unwrap();
        let lease = s.get_lease().unwrap().unwrap();
        assert_eq!(lease.owner_id, "042");
        assert_eq!(lease.lease_until, 145);

        s.try_acquire_or_renew_lease("007", "host", 2, 200, 45).unwrap();
        let lease = s.get_lease().unwrap().unwrap();
        assert_eq!(lease.owner_id, "007");
    }

    #[test]
    fn enqueue_then_lease_then_ack() {
        let s = store();
        s.enqueue_messages(&[NewMessage {
            msg_id: "m1".into(),
            ts: 100,
            ts_str: "t".into(),
            from_user: "007".into(),
            to_user: "042".into(),
            content: "hi".into(),
        }])
        .unwrap();

        let batch = s.select_and_lease_batch("042", 100, 30, 4000, 200).unwrap();
        assert_eq!(batch.messages.len(), 1);
        assert!(!batch.more_available);
        assert_eq!(batch.remaining, 0);

        // already leased, so a second select finds nothing new
        let empty = s.select_and_lease_batch("042", 101, 30, 4000, 200).unwrap();
        assert!(empty.messages.is_empty());

        let acked = s.ack_messages("042", &["m1".to_string()]).unwrap();
        assert_eq!(acked, 1);
    }

    #[test]
    fn expired_lease_is_recovered() {
        let s = store();
        s.enqueue_messages(&[NewMessage {
            msg_id: "m1".into(),
            ts: 100,
            ts_str: "t".into(),
            from_user: "007".into(),
            to_user: "042".into(),
            content: "hi".into(),
        }])
        .unwrap();
        s.select_and_lease_batch("042", 100, 30, 4000, 200).unwrap();

        let recovered = s.recover_expired_leases(500).unwrap();
        assert_eq!(recovered, 1);
        let batch = s.select_and_lease_batch("042", 500, 30, 4000, 200).unwrap();
        assert_eq!(batch.messages.len(), 1);
    }

    #[test]
    fn batch_respects_char_budget_but_always_includes_one() {
        let s = store();
        let big_content = "x".repeat(5000);
        s.enqueue_messages(&[
            NewMessage {
                msg_id: "m1".into(),
                ts: 100,
                ts_str: "t".into(),
                from_user: "007".into(),
                to_user: "042".into(),
                content: big_content,
            },
            NewMessage {
                msg_id: "m2".into(),
                ts: 101,
                ts_str: "t".into(),
                from_user: "007".into(),
                to_user: "042".into(),
                content: "small".into(),
            },
        ])
        .unwrap();

        let batch = s.select_and_lease_batch("042", 200, 30, 4000, 200).unwrap();
        assert_eq!(batch.messages.len(), 1);
        assert!(batch.more_available);
        assert_eq!(batch.remaining, 1);
    }

    #[test]
    fn deadlock_state_roundtrips() {
        let s = store();
        assert_eq!(s.deadlock_snapshot().unwrap(), DeadlockState::default());
        s.deadlock_mark_first_detected(100).unwrap();
        s.deadlock_mark_first_detected(150).unwrap();
        let snap = s.deadlock_snapshot().unwrap();
        assert_eq!(snap.first_detected_at, Some(100));
        s.deadlock_mark_warned(160).unwrap();
        let snap = s.deadlock_snapshot().unwrap();
        assert_eq!(snap.last_warned_at, Some(160));
        s.deadlock_reset().unwrap();
        assert_eq!(s.deadlock_snapshot().unwrap(), DeadlockState::default());
    }

    #[test]
    fn reap_and_prune() {
        let s = store();
        s.try_claim_agent("042", 1, "host", "/tmp", 100).unwrap();
        assert_eq!(s.reap_stale_agents(1000, 60).unwrap(), 1);
        assert!(s.get_agent("042").unwrap().is_none());

        s.enqueue_messages(&[NewMessage {
            msg_id: "m1".into(),
            ts: 100,
            ts_str: "t".into(),
            from_user: "007".into(),
            to_user: "042".into(),
            content: "hi".into(),
        }])
        .unwrap();
        let pruned = s.prune_expired_messages(100 + 86_400 + 1, 86_400).unwrap();
        assert_eq!(pruned, 1);
    }
}
