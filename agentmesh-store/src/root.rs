//! Pool-root resolution (spec §6 "Environment variables" / §4.A "Root
//! selection").

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// The one environment variable override for the pool root.
pub const POOL_ENV: &str = "AGENTMESH_HOME";

/// Resolves the pool root directory, creating it if necessary.
///
/// Resolution order:
/// 1. `AGENTMESH_HOME`, if set.
/// 2. An OS-appropriate state directory (`dirs::state_dir()`/`data_dir()`)
///    joined with `agentmesh`.
/// 3. `std::env::temp_dir().join("agentmesh")` as the public-writable
///    fallback.
///
/// Each candidate is tried in order; the first one that can be created
/// (or already exists) and is writable wins. Returns
/// [`StoreError::RootUnwritable`] if none of them work.
pub fn resolve() -> Result<PathBuf, StoreError> {
    let mut tried = Vec::new();

    if let Ok(from_env) = std::env::var(POOL_ENV) {
        let path = PathBuf::from(from_env);
        tried.push(path.display().to_string());
        if try_prepare(&path) {
            return Ok(path);
        }
    }

    if let Some(state) = dirs::state_dir().or_else(dirs::data_dir) {
        let path = state.join("agentmesh");
        tried.push(path.display().to_string());
        if try_prepare(&path) {
            return Ok(path);
        }
    }

    let fallback = std::env::temp_dir().join("agentmesh");
    tried.push(fallback.display().to_string());
    if try_prepare(&fallback) {
        return Ok(fallback);
    }

    Err(StoreError::RootUnwritable { tried })
}

fn try_prepare(path: &Path) -> bool {
    if fs::create_dir_all(path).is_err() {
        return false;
    }
    let probe = path.join(".write-probe");
    let ok = fs::write(&probe, b"ok").is_ok();
    let _ = fs::remove_file(&probe);
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};
    use tempfile::TempDir;

    /// `AGENTMESH_HOME` is process-global; serialize tests that touch it.
    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    #[test]
    fn env_override_wins() {
        let _guard = env_lock().lock().unwrap();
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("custom-root");
        std::env::set_var(POOL_ENV, &target);
        let resolved = resolve().unwrap();
        std::env::remove_var(POOL_ENV);
        assert_eq!(resolved, target);
        assert!(target.is_dir());
    }

    #[test]
    fn creates_directory_if_missing() {
        let _guard = env_lock().lock().unwrap();
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a/b/c");
        std::env::set_var(POOL_ENV, &target);
        let resolved = resolve().unwrap();
        std::env::remove_var(POOL_ENV);
        assert!(resolved.is_dir());
    }
}
