//! DDL and schema-version gate (spec §4.A "Root selection", §9).

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::StoreError;

/// Bump this when the table shapes change. A root whose existing file
/// encodes a different version is wiped and recreated, there is no
/// migration path (spec §4.A: "agents are expected to be stateless
/// across version bumps").
pub const CURRENT_VERSION: u32 = 1;

/// Returns the path of the Pool Store file for the current schema
/// version under `root`.
pub fn db_path(root: &Path) -> PathBuf {
    root.join(format!("pool-v{CURRENT_VERSION}.sqlite3"))
}

/// Deletes any Pool Store file (at any schema version) other than the
/// current one under `root`, including its `-wal`/`-shm` sidecars.
/// Leaves unrelated files alone.
pub fn wipe_stale_versions(root: &Path) -> std::io::Result<()> {
    if !root.is_dir() {
        return Ok(());
    }
    let current_stem = format!("pool-v{CURRENT_VERSION}.sqlite3");
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let is_pool_file = name.starts_with("pool-v")
            && (name.contains(".sqlite3"));
        if is_pool_file && !name.starts_with(&current_stem) {
            let _ = std::fs::remove_file(&path);
        }
    }
    Ok(())
}

/// Applies the DDL for [`CURRENT_VERSION`] to a freshly opened
/// connection. Idempotent (`CREATE TABLE IF NOT EXISTS`).
pub fn apply(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS peers (
            id              TEXT PRIMARY KEY,
            pid             INTEGER NOT NULL,
            hostname        TEXT NOT NULL,
            cwd             TEXT NOT NULL,
            last_seen       INTEGER NOT NULL,
            mode            TEXT NOT NULL,
            mode_since      INTEGER NOT NULL,
            recv_started    INTEGER,
            recv_deadline   INTEGER,
            recv_wait_seconds INTEGER,
            recv_last_touch INTEGER
        );

        CREATE TABLE IF NOT EXISTS messages (
            msg_id       TEXT PRIMARY KEY,
            ts           INTEGER NOT NULL,
            ts_str       TEXT NOT NULL,
            from_user    TEXT NOT NULL,
            to_user      TEXT NOT NULL,
            content      TEXT NOT NULL,
            state        TEXT NOT NULL,
            lease_owner  TEXT,
            lease_until  INTEGER,
            attempt      INTEGER NOT NULL DEFAULT 0,
            delivered_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_messages_to_state_ts
            ON messages (to_user, state, ts);

        CREATE TABLE IF NOT EXISTS leader_lease (
            key        TEXT PRIMARY KEY,
            owner_id   TEXT NOT NULL,
            host       TEXT NOT NULL,
            pid        INTEGER NOT NULL,
            lease_until INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS deadlock_state (
            key               TEXT PRIMARY KEY,
            first_detected_at INTEGER,
            last_warned_at    INTEGER
        );
        ",
    )
    .map_err(|e| StoreError::sqlite("apply schema", e))
}
