//! Connection setup: WAL journaling, `synchronous=NORMAL`, busy_timeout
//! (spec §4.A "Sessions").

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::StoreError;
use crate::schema;

/// A single SQLite connection to one Pool Store file, guarded by a
/// mutex because [`rusqlite::Connection`] is `!Sync`.
///
/// Spec §4.A: "Long-running connections are not shared between
/// threads." We relax that to "shared behind a mutex" rather than one
/// connection per thread, since a single agent process only ever needs
/// one writer at a time per store and opening a fresh connection per
/// call would defeat the WAL/cache benefits.
pub struct Handle {
    conn: Mutex<Connection>,
}

impl Handle {
    /// Opens (creating if necessary) the Pool Store file under `root`,
    /// wiping any stale-schema-version file first.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root).map_err(|e| StoreError::io("create pool root", e))?;
        schema::wipe_stale_versions(root).ok();

        let path = schema::db_path(root);
        let conn = Connection::open(&path).map_err(|e| StoreError::sqlite("open", e))?;
        configure(&conn)?;
        schema::apply(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory store, used by tests that don't need the
    /// filesystem at all.
    #[doc(hidden)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::sqlite("open", e))?;
        configure(&conn)?;
        schema::apply(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` with exclusive access to the connection. Every Pool
    /// Store primitive goes through this. Takes `&mut Connection` (not
    /// `&Connection`) so callers can open a real `rusqlite::Transaction`
    /// where a primitive needs more than one statement to be atomic.
    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>) -> rusqlite::Result<T> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }
}

fn configure(conn: &Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| StoreError::sqlite("set journal_mode", e))?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .map_err(|e| StoreError::sqlite("set synchronous", e))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(|e| StoreError::sqlite("set busy_timeout", e))?;
    Ok(())
}
